//! Anomaly detection over a category breakdown

use crate::models::{Anomaly, CategoryBreakdown, Severity};

/// Default share of spend above which a category is flagged
pub const DEFAULT_THRESHOLD_PCT: f64 = 30.0;

/// Flag every category whose percentage is strictly above `threshold_pct`
///
/// Anomalies come out in breakdown order (amount descending).
pub fn detect(breakdown: &CategoryBreakdown, threshold_pct: f64) -> Vec<Anomaly> {
    breakdown
        .iter()
        .filter(|spend| spend.percentage > threshold_pct)
        .map(|spend| Anomaly {
            category: spend.category,
            percentage: spend.percentage,
            severity: Severity::HighSpending,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, CategorySpend};

    fn breakdown(spends: &[(Category, f64)]) -> CategoryBreakdown {
        let total: f64 = spends.iter().map(|(_, a)| a).sum();
        CategoryBreakdown {
            categories: spends
                .iter()
                .map(|(c, a)| CategorySpend {
                    category: *c,
                    amount: *a,
                    percentage: a / total * 100.0,
                })
                .collect(),
            total,
            items_total: total,
            item_count: spends.len(),
        }
    }

    #[test]
    fn test_detect_flags_above_threshold() {
        let b = breakdown(&[(Category::Snacks, 40.0), (Category::Dairy, 6.0)]);
        let anomalies = detect(&b, DEFAULT_THRESHOLD_PCT);

        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].category, Category::Snacks);
        assert_eq!(anomalies[0].severity, Severity::HighSpending);
    }

    #[test]
    fn test_threshold_is_strict() {
        let b = breakdown(&[(Category::Meat, 30.0), (Category::Fruits, 70.0)]);
        let anomalies = detect(&b, 30.0);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].category, Category::Fruits);
    }

    #[test]
    fn test_every_flagged_category_exceeds_threshold() {
        let b = breakdown(&[
            (Category::Electronics, 50.0),
            (Category::Clothing, 35.0),
            (Category::Household, 15.0),
        ]);

        for threshold in [0.0, 10.0, 20.0, 34.9, 50.0, 100.0] {
            let anomalies = detect(&b, threshold);
            assert!(anomalies.iter().all(|a| a.percentage > threshold));
            let expected = b.iter().filter(|s| s.percentage > threshold).count();
            assert_eq!(anomalies.len(), expected);
        }
    }

    #[test]
    fn test_anomalies_keep_breakdown_order() {
        let b = breakdown(&[(Category::Clothing, 45.0), (Category::Cosmetics, 40.0), (Category::Others, 15.0)]);
        let cats: Vec<Category> = detect(&b, 30.0).iter().map(|a| a.category).collect();
        assert_eq!(cats, vec![Category::Clothing, Category::Cosmetics]);
    }
}
