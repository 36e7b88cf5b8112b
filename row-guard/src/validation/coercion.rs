//! Type checks for declared field types.
//!
//! Each check answers "can this value be read as the declared type?". None of
//! them panic or error; a `false` becomes an `invalid <type>` violation.

use crate::core::Value;
use crate::rules::FieldType;
use chrono::{DateTime, NaiveDate, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;

#[allow(clippy::expect_used)]
static INT_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[+-]?\d+(?:_\d+)*\s*$").expect("Invalid int regex"));

#[allow(clippy::expect_used)]
static DECIMAL_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*[+-]?(?:(?:\d+(?:\.\d*)?|\.\d+)(?:e[+-]?\d+)?|inf(?:inity)?|s?nan\d*)\s*$")
        .expect("Invalid decimal regex")
});

/// Returns true if `value` satisfies the declared type.
///
/// Unchecked (unknown) types always pass.
pub fn conforms(value: &Value, field_type: &FieldType) -> bool {
    match field_type {
        FieldType::Int => is_int(value),
        FieldType::Float => is_float(value),
        FieldType::Decimal => is_decimal(value),
        FieldType::Date => is_date(value),
        FieldType::Str | FieldType::Unchecked(_) => true,
    }
}

fn is_int(value: &Value) -> bool {
    match value {
        Value::Int(_) | Value::Bool(_) => true,
        Value::Float(f) => f.is_finite(),
        Value::Text(s) => INT_TEXT.is_match(s),
        Value::Date(_) | Value::DateTime(_) => false,
    }
}

fn is_float(value: &Value) -> bool {
    match value {
        Value::Int(_) | Value::Float(_) | Value::Bool(_) => true,
        Value::Text(s) => s.trim().replace('_', "").parse::<f64>().is_ok(),
        Value::Date(_) | Value::DateTime(_) => false,
    }
}

fn is_decimal(value: &Value) -> bool {
    match value {
        Value::Int(_) | Value::Float(_) => true,
        Value::Text(s) => DECIMAL_TEXT.is_match(s),
        Value::Bool(_) | Value::Date(_) | Value::DateTime(_) => false,
    }
}

fn is_date(value: &Value) -> bool {
    match value {
        Value::Date(_) | Value::DateTime(_) => true,
        Value::Text(s) => is_iso_datetime(s),
        Value::Int(_) | Value::Float(_) | Value::Bool(_) => false,
    }
}

/// Accepts `YYYY-MM-DD`, optionally followed by `T` or a space and a time
/// (`HH:MM`, `HH:MM:SS`, fractional seconds) with an optional `Z` or
/// `±HH:MM` offset.
pub fn is_iso_datetime(text: &str) -> bool {
    if NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok() && text.len() == 10 {
        return true;
    }
    if DateTime::parse_from_rfc3339(text).is_ok() {
        return true;
    }

    let Some(date_part) = text.get(..10) else {
        return false;
    };
    if NaiveDate::parse_from_str(date_part, "%Y-%m-%d").is_err() {
        return false;
    }
    let rest = &text[10..];
    let Some(time) = rest.strip_prefix('T').or_else(|| rest.strip_prefix(' ')) else {
        return false;
    };
    let time = strip_offset(time);
    ["%H:%M:%S%.f", "%H:%M"]
        .iter()
        .any(|fmt| NaiveTime::parse_from_str(time, fmt).is_ok())
}

fn strip_offset(time: &str) -> &str {
    if let Some(stripped) = time.strip_suffix('Z') {
        return stripped;
    }
    match time.rfind(['+', '-']) {
        Some(idx) if NaiveTime::parse_from_str(&time[idx + 1..], "%H:%M").is_ok() => &time[..idx],
        _ => time,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Value {
        Value::text(s)
    }

    #[test]
    fn test_int() {
        for ok in ["30", " -7 ", "+12", "1_000", "007"] {
            assert!(conforms(&text(ok), &FieldType::Int), "{ok}");
        }
        for bad in ["bad", "1.5", "", "1e3", "1__0", " "] {
            assert!(!conforms(&text(bad), &FieldType::Int), "{bad}");
        }
        assert!(conforms(&Value::Float(2.5), &FieldType::Int));
        assert!(!conforms(&Value::Float(f64::NAN), &FieldType::Int));
        assert!(conforms(&Value::Bool(true), &FieldType::Int));
    }

    #[test]
    fn test_float() {
        for ok in ["1.5", " 2 ", "1e-3", "inf", "-Infinity", "nan", ".5"] {
            assert!(conforms(&text(ok), &FieldType::Float), "{ok}");
        }
        for bad in ["abc", "", "1.2.3"] {
            assert!(!conforms(&text(bad), &FieldType::Float), "{bad}");
        }
        assert!(conforms(&Value::Int(3), &FieldType::Float));
    }

    #[test]
    fn test_decimal() {
        for ok in ["10.25", "-1E+5", "NaN", "Infinity", "5.", ".5", " 3 "] {
            assert!(conforms(&text(ok), &FieldType::Decimal), "{ok}");
        }
        for bad in ["ten", "1,5", ""] {
            assert!(!conforms(&text(bad), &FieldType::Decimal), "{bad}");
        }
        assert!(!conforms(&Value::Bool(false), &FieldType::Decimal));
    }

    #[test]
    fn test_date() {
        for ok in [
            "2024-01-31",
            "2024-01-31T10:15",
            "2024-01-31 10:15:30",
            "2024-01-31T10:15:30.123456",
            "2024-01-31T10:15:30Z",
            "2024-01-31T10:15:30+02:00",
        ] {
            assert!(conforms(&text(ok), &FieldType::Date), "{ok}");
        }
        for bad in ["2024-02-30", "31/01/2024", "2024-01-31X", "yesterday", ""] {
            assert!(!conforms(&text(bad), &FieldType::Date), "{bad}");
        }
        let day = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        assert!(conforms(&Value::Date(day), &FieldType::Date));
        assert!(!conforms(&Value::Int(45000), &FieldType::Date));
    }

    #[test]
    fn test_str_and_unchecked_always_pass() {
        assert!(conforms(&Value::Float(1.0), &FieldType::Str));
        assert!(conforms(
            &text("anything"),
            &FieldType::Unchecked("uuid".to_string())
        ));
    }
}
