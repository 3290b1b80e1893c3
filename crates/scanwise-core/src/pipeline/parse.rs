//! Structured parser: receipt text to [`ParsedReceipt`]
//!
//! Model output is untrusted. The reply is unwrapped from a markdown code
//! fence if present, parsed as JSON, and validated field by field.

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::ai::{CompletionRequest, LanguageModel, UpstreamFailure};
use crate::config::{Config, StageKind, StageSettings};
use crate::error::ErrorKind;
use crate::models::{Category, LineItem, ParsedReceipt};
use crate::prompts::{Prompt, PromptId, PromptLibrary};

/// Parser failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("receipt text is empty")]
    EmptyInput,

    #[error("language model call failed: {0}")]
    UpstreamFailure(#[from] UpstreamFailure),

    #[error("response is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("response does not match the receipt schema: {0}")]
    SchemaMismatch(String),
}

impl ParseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyInput => ErrorKind::EmptyInput,
            Self::UpstreamFailure(_) => ErrorKind::UpstreamFailure,
            Self::MalformedJson(_) => ErrorKind::MalformedJson,
            Self::SchemaMismatch(_) => ErrorKind::SchemaMismatch,
        }
    }
}

/// Turns OCR receipt text into a [`ParsedReceipt`] with one model call
#[derive(Clone)]
pub struct StructuredParser<M> {
    model: M,
    prompt: Prompt,
    settings: StageSettings,
}

impl<M: LanguageModel> StructuredParser<M> {
    pub fn new(model: M, prompt: Prompt, settings: StageSettings) -> Self {
        Self {
            model,
            prompt,
            settings,
        }
    }

    /// Build with the `parse_receipt` prompt and the configured `parse` settings
    pub fn from_library(
        model: M,
        prompts: &mut PromptLibrary,
        config: &Config,
    ) -> crate::Result<Self> {
        let prompt = prompts.get(PromptId::ParseReceipt)?.clone();
        Ok(Self::new(model, prompt, config.settings(StageKind::Parse)))
    }

    /// Parse receipt text
    pub async fn parse(&self, text: &str) -> Result<ParsedReceipt, ParseError> {
        self.parse_with_usage(text).await.map(|(receipt, _)| receipt)
    }

    /// Parse receipt text, also returning the tokens the model reported
    pub async fn parse_with_usage(&self, text: &str) -> Result<(ParsedReceipt, u32), ParseError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ParseError::EmptyInput);
        }

        let categories = Category::prompt_list();
        let mut vars = HashMap::new();
        vars.insert("categories", categories.as_str());
        vars.insert("receipt_text", text);

        let request = CompletionRequest::new(
            self.prompt.render_system(&vars),
            self.prompt.render_user(&vars),
        )
        .with_temperature(self.settings.temperature)
        .with_max_tokens(self.settings.max_tokens);

        let completion = self.model.complete(&request).await?;
        debug!(
            tokens = completion.tokens_used,
            chars = completion.text.len(),
            "Receipt parse response"
        );

        let receipt = parse_receipt_json(&completion.text).map_err(|e| {
            warn!(error = %e, "Receipt response rejected");
            e
        })?;

        Ok((receipt, completion.tokens_used))
    }
}

fn fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```[A-Za-z]*[ \t]*\r?\n?(.*?)```").expect("valid regex"))
}

/// Return the content of the first markdown code fence, or the trimmed text
///
/// The language tag after the opening fence (e.g. `json`) is dropped.
pub fn strip_code_fence(text: &str) -> &str {
    match fence_regex().captures(text).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => text.trim(),
    }
}

/// Parse a model reply into a validated receipt
pub fn parse_receipt_json(raw: &str) -> Result<ParsedReceipt, ParseError> {
    let value = extract_json(raw)?;
    receipt_from_value(value)
}

/// Fence-strip and parse; fall back to the outermost `{...}` span
fn extract_json(raw: &str) -> Result<Value, ParseError> {
    let body = strip_code_fence(raw);

    match serde_json::from_str::<Value>(body) {
        Ok(value) => Ok(value),
        Err(first_err) => {
            let span = body
                .find('{')
                .zip(body.rfind('}'))
                .filter(|(start, end)| start < end)
                .map(|(start, end)| &body[start..=end]);

            span.and_then(|s| serde_json::from_str::<Value>(s).ok())
                .ok_or_else(|| ParseError::MalformedJson(first_err.to_string()))
        }
    }
}

fn receipt_from_value(value: Value) -> Result<ParsedReceipt, ParseError> {
    let Value::Object(obj) = value else {
        return Err(ParseError::SchemaMismatch(
            "top-level value is not an object".into(),
        ));
    };

    let total = match obj.get("total") {
        None | Some(Value::Null) => {
            return Err(ParseError::SchemaMismatch("missing required field: total".into()))
        }
        Some(v) => parse_number(v)
            .filter(|t| t.is_finite())
            .ok_or_else(|| ParseError::SchemaMismatch(format!("total is not numeric: {}", v)))?,
    };

    let items = match obj.get("items") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(raw_items)) => raw_items
            .iter()
            .enumerate()
            .map(|(i, item)| line_item_from_value(i, item))
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err(ParseError::SchemaMismatch("items is not an array".into())),
    };

    Ok(ParsedReceipt {
        store_name: string_field(&obj, "store_name"),
        date: string_field(&obj, "date")
            .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
        items,
        subtotal: obj.get("subtotal").and_then(parse_number).filter(|n| n.is_finite()),
        tax: obj.get("tax").and_then(parse_number).filter(|n| n.is_finite()),
        total,
    })
}

fn line_item_from_value(index: usize, value: &Value) -> Result<LineItem, ParseError> {
    let Value::Object(obj) = value else {
        return Err(ParseError::SchemaMismatch(format!(
            "item {} is not an object",
            index
        )));
    };

    let quantity = numeric_or_default(obj, &["quantity", "qty"], 1.0, index)?;
    let unit_price = numeric_or_default(obj, &["price", "unit_price"], 0.0, index)?;
    if !(quantity * unit_price).is_finite() {
        return Err(ParseError::SchemaMismatch(format!(
            "item {} line total overflows: {} x {}",
            index, quantity, unit_price
        )));
    }

    let category = obj
        .get("category")
        .and_then(Value::as_str)
        .map(Category::from_label)
        .unwrap_or_default();

    Ok(LineItem {
        name: string_field(obj, "name").unwrap_or_else(|| format!("Item {}", index + 1)),
        quantity,
        unit_price,
        category,
    })
}

/// First present key wins; absent or null uses the default
fn numeric_or_default(
    obj: &Map<String, Value>,
    keys: &[&str],
    default: f64,
    index: usize,
) -> Result<f64, ParseError> {
    let Some((key, value)) = keys
        .iter()
        .find_map(|k| obj.get(*k).filter(|v| !v.is_null()).map(|v| (*k, v)))
    else {
        return Ok(default);
    };

    let n = parse_number(value)
        .filter(|n| n.is_finite())
        .ok_or_else(|| {
            ParseError::SchemaMismatch(format!("item {} {} is not numeric: {}", index, key, value))
        })?;

    if n < 0.0 {
        return Err(ParseError::SchemaMismatch(format!(
            "item {} {} is negative: {}",
            index, key, n
        )));
    }
    Ok(n)
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Numbers, or strings such as `"$1,234.50"`, `"12,50 €"` or `" 12 "`
fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let decimal_comma = decimal_comma_position(s);
            let cleaned: String = s
                .char_indices()
                .filter_map(|(i, c)| match c {
                    '0'..='9' | '-' => Some(c),
                    '.' if decimal_comma.is_none() => Some(c),
                    ',' if decimal_comma == Some(i) => Some('.'),
                    _ => None,
                })
                .collect();
            if cleaned.is_empty() {
                None
            } else {
                cleaned.parse().ok()
            }
        }
        _ => None,
    }
}

/// A last comma followed by one or two digits and no later point is a
/// decimal separator (`12,50`, `1.234,5`); any other comma groups thousands
fn decimal_comma_position(s: &str) -> Option<usize> {
    let pos = s.rfind(',')?;
    let tail = &s[pos + 1..];
    let digits = tail.chars().take_while(char::is_ascii_digit).count();
    ((1..=2).contains(&digits) && !tail.contains('.')).then_some(pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{Completion, MockBackend};

    fn parser(mock: &MockBackend) -> StructuredParser<MockBackend> {
        let mut prompts = PromptLibrary::embedded_only();
        StructuredParser::from_library(mock.clone(), &mut prompts, &Config::default()).unwrap()
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("Here you go:\n```JSON\n{}\n```\nThanks"), "{}");
        assert_eq!(strip_code_fence("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn test_parse_valid_receipt() {
        let raw = r#"{
            "store_name": "Corner Shop",
            "date": "2024-05-01",
            "items": [
                {"name": "Milk", "quantity": 2, "price": 3.0, "category": "dairy"},
                {"name": "Lipstick", "price": "$12.50", "category": "Beauty"}
            ],
            "subtotal": 18.5,
            "tax": null,
            "total": "18.50"
        }"#;

        let receipt = parse_receipt_json(raw).unwrap();
        assert_eq!(receipt.store_name.as_deref(), Some("Corner Shop"));
        assert_eq!(receipt.date, NaiveDate::from_ymd_opt(2024, 5, 1));
        assert_eq!(receipt.items.len(), 2);
        assert_eq!(receipt.items[0].category, Category::Dairy);
        assert!((receipt.items[1].quantity - 1.0).abs() < f64::EPSILON);
        assert!((receipt.items[1].unit_price - 12.5).abs() < f64::EPSILON);
        assert_eq!(receipt.items[1].category, Category::Others);
        assert_eq!(receipt.tax, None);
        assert!((receipt.total - 18.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_missing_total_is_schema_mismatch() {
        let err = parse_receipt_json(r#"{"items": []}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);

        let err = parse_receipt_json(r#"{"items": [], "total": null}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);

        let err = parse_receipt_json(r#"{"total": "n/a"}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
    }

    #[test]
    fn test_bad_shapes_are_schema_mismatch() {
        assert!(matches!(
            parse_receipt_json("[1, 2, 3]"),
            Err(ParseError::SchemaMismatch(_))
        ));
        assert!(matches!(
            parse_receipt_json(r#"{"total": 5, "items": "milk"}"#),
            Err(ParseError::SchemaMismatch(_))
        ));
        assert!(matches!(
            parse_receipt_json(r#"{"total": 5, "items": ["milk"]}"#),
            Err(ParseError::SchemaMismatch(_))
        ));
        assert!(matches!(
            parse_receipt_json(r#"{"total": 5, "items": [{"name": "x", "quantity": -1}]}"#),
            Err(ParseError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_not_json_is_malformed() {
        let err = parse_receipt_json("Sorry, I cannot read this receipt.").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedJson);

        let err = parse_receipt_json("```json\n{\"total\": 5,\n```").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedJson);
    }

    #[test]
    fn test_prose_around_object_falls_back_to_span() {
        let raw = "Sure! Here is the data: {\"total\": 9.99, \"items\": []} Let me know.";
        let receipt = parse_receipt_json(raw).unwrap();
        assert!((receipt.total - 9.99).abs() < f64::EPSILON);
        assert!(receipt.items.is_empty());
    }

    #[test]
    fn test_invalid_date_dropped() {
        let receipt = parse_receipt_json(r#"{"total": 1, "date": "15/03/2024"}"#).unwrap();
        assert_eq!(receipt.date, None);
    }

    #[test]
    fn test_overflowing_line_total_is_schema_mismatch() {
        let raw = r#"{"total": 10, "items": [{"name": "x", "quantity": 1e200, "price": 1e200}]}"#;
        let err = parse_receipt_json(raw).unwrap_err();
        assert!(matches!(err, ParseError::SchemaMismatch(ref m) if m.contains("overflows")));
        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
    }

    #[test]
    fn test_numeric_strings() {
        let n = |s: &str| parse_number(&Value::String(s.to_string()));
        assert_eq!(n("$1,234.50"), Some(1234.5));
        assert_eq!(n(" 12 "), Some(12.0));
        assert_eq!(n("1,234"), Some(1234.0));
        assert_eq!(n("12,50"), Some(12.5));
        assert_eq!(n("12,5 €"), Some(12.5));
        assert_eq!(n("1.234,50"), Some(1234.5));
        assert_eq!(n("n/a"), None);
    }

    #[test]
    fn test_decimal_comma_price() {
        let raw = r#"{"total": "25,00", "items": [{"name": "Wine", "quantity": 2, "price": "12,50"}]}"#;
        let receipt = parse_receipt_json(raw).unwrap();
        assert!((receipt.total - 25.0).abs() < 1e-9);
        assert!((receipt.items[0].line_total() - 25.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_call() {
        let mock = MockBackend::new();
        let parser = parser(&mock);

        assert_eq!(parser.parse("").await.unwrap_err(), ParseError::EmptyInput);
        assert_eq!(parser.parse("   \n\t").await.unwrap_err(), ParseError::EmptyInput);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_parse_sends_configured_request() {
        let mock = MockBackend::new();
        let parser = parser(&mock);

        let (receipt, tokens) = parser.parse_with_usage("MILK 2 x 3.00\nCHIPS 40.00").await.unwrap();
        assert_eq!(receipt.items.len(), 2);
        assert_eq!(tokens, 120);

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].system.contains("Personal Care"));
        assert!(requests[0].user.contains("CHIPS 40.00"));
        assert!((requests[0].temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(requests[0].max_tokens, 1500);
    }

    #[tokio::test]
    async fn test_upstream_failure_propagates() {
        let mock = MockBackend::scripted(vec![Err(UpstreamFailure::RateLimited)]);
        let parser = parser(&mock);

        let err = parser.parse("MILK 3.00").await.unwrap_err();
        assert_eq!(err, ParseError::UpstreamFailure(UpstreamFailure::RateLimited));
        assert_eq!(err.kind(), ErrorKind::UpstreamFailure);
    }

    #[tokio::test]
    async fn test_fenced_reply_parsed() {
        let mock = MockBackend::scripted(vec![Ok(Completion::new(
            "```json\n{\"total\": 12.0, \"items\": [{\"name\": \"Soap\", \"price\": 12, \"category\": \"Personal_Care\"}]}\n```",
            30,
        ))]);
        let parser = parser(&mock);

        let receipt = parser.parse("SOAP 12.00").await.unwrap();
        assert_eq!(receipt.items[0].category, Category::PersonalCare);
    }
}
