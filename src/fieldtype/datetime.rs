use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use crate::fieldtype::Fieldtype;
use crate::page::Page;
use crate::schema::Field;

/// Timestamp field. Stored in memory as a unix timestamp; formats to
/// RFC 3339 for display.
#[derive(Debug, Default)]
pub struct DatetimeFieldtype;

/// Parse a timestamp from a number or a handful of date string shapes.
pub fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(n) = s.parse::<i64>() {
                return Some(n);
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.timestamp());
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(dt.and_utc().timestamp());
            }
            if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                return Some(d.and_hms_opt(0, 0, 0)?.and_utc().timestamp());
            }
            None
        }
        _ => None,
    }
}

impl Fieldtype for DatetimeFieldtype {
    fn name(&self) -> &'static str {
        "DatetimeFieldtype"
    }

    fn wakeup_value(&self, _page: &Page, _field: &Field, raw: Value) -> Value {
        Value::from(parse_timestamp(&raw).unwrap_or(0))
    }

    fn sanitize_value(&self, _page: &Page, _field: &Field, value: Value) -> Value {
        Value::from(parse_timestamp(&value).unwrap_or(0))
    }

    fn format_value(&self, _page: &Page, _field: &Field, value: &Value) -> Value {
        let ts = value.as_i64().unwrap_or(0);
        match DateTime::<Utc>::from_timestamp(ts, 0) {
            Some(dt) => Value::String(dt.to_rfc3339()),
            None => Value::String(String::new()),
        }
    }

    fn blank_value(&self, _page: &Page, _field: &Field) -> Value {
        Value::from(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_numbers_and_date_strings() {
        assert_eq!(parse_timestamp(&json!(1700000000)), Some(1700000000));
        assert_eq!(parse_timestamp(&json!("1700000000")), Some(1700000000));
        assert_eq!(parse_timestamp(&json!("1970-01-01 00:00:10")), Some(10));
        assert_eq!(parse_timestamp(&json!("1970-01-02")), Some(86400));
        assert_eq!(parse_timestamp(&json!("not a date")), None);
    }
}
