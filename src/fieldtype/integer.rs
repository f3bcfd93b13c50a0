use serde_json::Value;

use crate::fieldtype::Fieldtype;
use crate::page::Page;
use crate::schema::Field;

/// Whole-number field. Coerces anything plausibly numeric to i64.
#[derive(Debug, Default)]
pub struct IntegerFieldtype;

fn to_integer(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n.as_i64().unwrap_or_else(|| n.as_f64().map(|f| f as i64).unwrap_or(0)),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        Value::Bool(b) => *b as i64,
        _ => 0,
    }
}

impl Fieldtype for IntegerFieldtype {
    fn name(&self) -> &'static str {
        "IntegerFieldtype"
    }

    fn wakeup_value(&self, _page: &Page, _field: &Field, raw: Value) -> Value {
        Value::from(to_integer(&raw))
    }

    fn sanitize_value(&self, _page: &Page, _field: &Field, value: Value) -> Value {
        Value::from(to_integer(&value))
    }

    fn format_value(&self, _page: &Page, _field: &Field, value: &Value) -> Value {
        value.clone()
    }

    fn blank_value(&self, _page: &Page, _field: &Field) -> Value {
        Value::from(0)
    }
}
