//! crates/poc_portal_core/src/filter.rs
//!
//! Natural-key filters in the record store's query grammar:
//! `field="text"`, `field=42`, `field=true`, `field~"text"`, joined with ` && `.

use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Number(i64),
    Bool(bool),
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        FilterValue::Text(v.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        FilterValue::Text(v)
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        FilterValue::Number(v)
    }
}

impl From<bool> for FilterValue {
    fn from(v: bool) -> Self {
        FilterValue::Bool(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `=`
    Eq,
    /// `~`, case-insensitive substring match.
    Like,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub op: Operator,
    pub value: FilterValue,
}

/// A conjunction of conditions. An empty filter matches every record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<FilterValue>) -> Self {
        self.conditions.push(Condition {
            field: field.to_string(),
            op: Operator::Eq,
            value: value.into(),
        });
        self
    }

    pub fn like(mut self, field: &str, text: &str) -> Self {
        self.conditions.push(Condition {
            field: field.to_string(),
            op: Operator::Like,
            value: FilterValue::Text(text.to_string()),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluates the filter against a raw record the way the backend would.
    /// Absent fields compare as the backend's zero values ("", 0, false).
    pub fn matches(&self, record: &Value) -> bool {
        self.conditions.iter().all(|c| {
            let field = record.get(&c.field).unwrap_or(&Value::Null);
            match (&c.op, &c.value) {
                (Operator::Eq, FilterValue::Text(expected)) => {
                    field.as_str().unwrap_or_default() == expected
                }
                (Operator::Eq, FilterValue::Number(expected)) => {
                    field.as_f64().unwrap_or_default() == *expected as f64
                }
                (Operator::Eq, FilterValue::Bool(expected)) => {
                    field.as_bool().unwrap_or_default() == *expected
                }
                (Operator::Like, value) => {
                    let needle = match value {
                        FilterValue::Text(t) => t.to_lowercase(),
                        FilterValue::Number(n) => n.to_string(),
                        FilterValue::Bool(b) => b.to_string(),
                    };
                    let haystack = match field {
                        Value::String(s) => s.to_lowercase(),
                        Value::Null => String::new(),
                        other => other.to_string(),
                    };
                    haystack.contains(&needle)
                }
            }
        })
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Text(t) => write!(f, "\"{}\"", escape(t)),
            FilterValue::Number(n) => write!(f, "{n}"),
            FilterValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, c) in self.conditions.iter().enumerate() {
            if i > 0 {
                f.write_str(" && ")?;
            }
            let op = match c.op {
                Operator::Eq => "=",
                Operator::Like => "~",
            };
            write!(f, "{}{}{}", c.field, op, c.value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_conjunction_in_backend_grammar() {
        let filter = Filter::new()
            .eq("code", "dash")
            .eq("version", 2i64)
            .eq("is_active", true);
        assert_eq!(filter.to_string(), r#"code="dash" && version=2 && is_active=true"#);
    }

    #[test]
    fn escapes_quotes_in_text_values() {
        let filter = Filter::new().eq("customer_name", r#"Acme "Bank""#);
        assert_eq!(filter.to_string(), r#"customer_name="Acme \"Bank\"""#);
    }

    #[test]
    fn renders_like_operator() {
        let filter = Filter::new().like("email", "a@x.com");
        assert_eq!(filter.to_string(), r#"email~"a@x.com""#);
    }

    #[test]
    fn matches_equality_and_substring() {
        let record = json!({"code": "dash", "version": 1, "email": "A@X.com"});
        assert!(Filter::new().eq("code", "dash").eq("version", 1i64).matches(&record));
        assert!(!Filter::new().eq("code", "dash").eq("version", 2i64).matches(&record));
        assert!(Filter::new().like("email", "a@x").matches(&record));
        assert!(Filter::new().matches(&record));
    }

    #[test]
    fn missing_fields_compare_as_zero_values() {
        let record = json!({"id": "x"});
        assert!(Filter::new().eq("is_active", false).matches(&record));
        assert!(Filter::new().eq("poc", "").matches(&record));
        assert!(!Filter::new().eq("poc", "p1").matches(&record));
    }
}
