//! Spending aggregation by category

use thiserror::Error;

use crate::error::ErrorKind;
use crate::models::{Category, CategoryBreakdown, CategorySpend, ParsedReceipt};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AggregateError {
    #[error("insufficient data: {0}")]
    InsufficientData(String),
}

impl AggregateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InsufficientData(_) => ErrorKind::InsufficientData,
        }
    }
}

/// Group line totals by category
///
/// Percentages are relative to the receipt `total`, not the item sum, so
/// they need not add up to 100 when the two disagree. Categories are sorted
/// by amount descending; ties keep first-seen order.
pub fn aggregate(receipt: &ParsedReceipt) -> Result<CategoryBreakdown, AggregateError> {
    if receipt.items.is_empty() {
        return Err(AggregateError::InsufficientData(
            "receipt has no items".into(),
        ));
    }
    if !receipt.total.is_finite() || receipt.total <= 0.0 {
        return Err(AggregateError::InsufficientData(format!(
            "receipt total must be positive, got {}",
            receipt.total
        )));
    }

    let mut amounts: Vec<(Category, f64)> = Vec::new();
    for item in &receipt.items {
        let line_total = item.line_total();
        match amounts.iter_mut().find(|(c, _)| *c == item.category) {
            Some((_, amount)) => *amount += line_total,
            None => amounts.push((item.category, line_total)),
        }
    }

    // sort_by is stable
    amounts.sort_by(|a, b| b.1.total_cmp(&a.1));

    let categories: Vec<CategorySpend> = amounts
        .into_iter()
        .map(|(category, amount)| CategorySpend {
            category,
            amount,
            percentage: amount / receipt.total * 100.0,
        })
        .collect();

    // Non-finite values would serialize as null and could not be stored
    let items_total = receipt.items_total();
    if let Some(bad) = categories
        .iter()
        .find(|c| !c.amount.is_finite() || !c.percentage.is_finite())
    {
        return Err(AggregateError::InsufficientData(format!(
            "{} amount is not a finite number",
            bad.category
        )));
    }
    if !items_total.is_finite() {
        return Err(AggregateError::InsufficientData(
            "item total is not a finite number".into(),
        ));
    }

    Ok(CategoryBreakdown {
        categories,
        total: receipt.total,
        items_total,
        item_count: receipt.items.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LineItem;

    fn receipt(items: Vec<LineItem>, total: f64) -> ParsedReceipt {
        ParsedReceipt {
            store_name: None,
            date: None,
            items,
            subtotal: None,
            tax: None,
            total,
        }
    }

    #[test]
    fn test_aggregate_groups_and_sorts() {
        let r = receipt(
            vec![
                LineItem::new("Milk", 2.0, 3.0, Category::Dairy),
                LineItem::new("Chips", 1.0, 40.0, Category::Snacks),
            ],
            46.0,
        );

        let breakdown = aggregate(&r).unwrap();
        assert_eq!(breakdown.len(), 2);
        assert_eq!(breakdown.categories[0].category, Category::Snacks);
        assert!((breakdown.categories[0].amount - 40.0).abs() < 1e-9);
        assert!((breakdown.categories[0].percentage - 86.956_521_7).abs() < 1e-4);
        assert_eq!(breakdown.categories[1].category, Category::Dairy);
        assert!((breakdown.categories[1].amount - 6.0).abs() < 1e-9);
        assert!((breakdown.categories[1].percentage - 13.043_478_3).abs() < 1e-4);
        assert_eq!(breakdown.item_count, 2);
    }

    #[test]
    fn test_amounts_sum_to_item_total() {
        let r = receipt(
            vec![
                LineItem::new("Apple", 3.0, 0.5, Category::Fruits),
                LineItem::new("Pear", 2.0, 0.75, Category::Fruits),
                LineItem::new("Bread", 1.0, 2.25, Category::Bakery),
                LineItem::new("Soap", 1.0, 1.99, Category::PersonalCare),
            ],
            8.0,
        );

        let breakdown = aggregate(&r).unwrap();
        let sum: f64 = breakdown.iter().map(|c| c.amount).sum();
        assert!((sum - r.items_total()).abs() < 1e-9);
        assert!((breakdown.items_total - 7.24).abs() < 1e-9);
        assert!((breakdown.discrepancy() - 0.76).abs() < 1e-9);
        assert!(breakdown.percentage_sum() < 100.0);
    }

    #[test]
    fn test_ties_keep_first_seen_order() {
        let r = receipt(
            vec![
                LineItem::new("Tea", 1.0, 5.0, Category::Beverages),
                LineItem::new("Cake", 1.0, 5.0, Category::Bakery),
                LineItem::new("Steak", 1.0, 10.0, Category::Meat),
            ],
            20.0,
        );

        let order: Vec<Category> = aggregate(&r).unwrap().iter().map(|c| c.category).collect();
        assert_eq!(
            order,
            vec![Category::Meat, Category::Beverages, Category::Bakery]
        );
    }

    #[test]
    fn test_mismatched_total_tolerated() {
        let r = receipt(vec![LineItem::new("TV", 1.0, 500.0, Category::Electronics)], 400.0);
        let breakdown = aggregate(&r).unwrap();
        assert!((breakdown.categories[0].percentage - 125.0).abs() < 1e-9);
    }

    #[test]
    fn test_insufficient_data() {
        let empty = receipt(vec![], 10.0);
        assert_eq!(aggregate(&empty).unwrap_err().kind(), ErrorKind::InsufficientData);

        let zero = receipt(vec![LineItem::new("Gift", 1.0, 0.0, Category::Others)], 0.0);
        assert_eq!(aggregate(&zero).unwrap_err().kind(), ErrorKind::InsufficientData);

        let negative = receipt(vec![LineItem::new("Refund", 1.0, 5.0, Category::Others)], -5.0);
        assert!(aggregate(&negative).is_err());
    }

    #[test]
    fn test_overflowing_amounts_rejected() {
        let huge = receipt(
            vec![LineItem::new("Yacht", 1e200, 1e200, Category::Others)],
            10.0,
        );
        assert_eq!(aggregate(&huge).unwrap_err().kind(), ErrorKind::InsufficientData);

        // Each line is finite but the category sum is not
        let summed = receipt(
            vec![
                LineItem::new("A", 1.0, f64::MAX, Category::Electronics),
                LineItem::new("B", 1.0, f64::MAX, Category::Electronics),
            ],
            10.0,
        );
        assert_eq!(aggregate(&summed).unwrap_err().kind(), ErrorKind::InsufficientData);

        // Finite amount, but the share of a tiny total is not
        let share = receipt(vec![LineItem::new("C", 1.0, 1e300, Category::Others)], 1e-300);
        assert!(aggregate(&share).is_err());
    }
}
