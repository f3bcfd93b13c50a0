use std::rc::Rc;

use serde_json::Value;

use crate::fieldtype::Fieldtype;
use crate::page::Page;
use crate::schema::Field;

/// Display-time text transform, applied in order by `TextFieldtype`.
pub trait Textformatter {
    fn name(&self) -> &'static str;
    fn format(&self, text: &mut String);
}

/// HTML-entity encodes markup-significant characters.
pub struct TextformatterEntities;

impl Textformatter for TextformatterEntities {
    fn name(&self) -> &'static str {
        "TextformatterEntities"
    }

    fn format(&self, text: &mut String) {
        if !text.contains(['&', '<', '>', '"', '\'']) {
            return;
        }
        let mut out = String::with_capacity(text.len() + 8);
        for c in text.chars() {
            match c {
                '&' => out.push_str("&amp;"),
                '<' => out.push_str("&lt;"),
                '>' => out.push_str("&gt;"),
                '"' => out.push_str("&quot;"),
                '\'' => out.push_str("&#039;"),
                _ => out.push(c),
            }
        }
        *text = out;
    }
}

/// Plain text field. Formatting runs the configured textformatter chain,
/// so a formatted value can differ from the raw one; that difference is
/// what the page's corruption guard keys off.
pub struct TextFieldtype {
    formatters: Vec<Rc<dyn Textformatter>>,
}

impl TextFieldtype {
    pub fn new() -> Self {
        Self { formatters: Vec::new() }
    }

    pub fn with_formatter(mut self, formatter: Rc<dyn Textformatter>) -> Self {
        self.formatters.push(formatter);
        self
    }
}

impl Default for TextFieldtype {
    fn default() -> Self {
        Self::new()
    }
}

fn to_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl Fieldtype for TextFieldtype {
    fn name(&self) -> &'static str {
        "TextFieldtype"
    }

    fn wakeup_value(&self, _page: &Page, _field: &Field, raw: Value) -> Value {
        Value::String(to_text(raw))
    }

    fn sanitize_value(&self, _page: &Page, _field: &Field, value: Value) -> Value {
        let mut text = to_text(value);
        text.retain(|c| c != '\0');
        Value::String(text)
    }

    fn format_value(&self, _page: &Page, _field: &Field, value: &Value) -> Value {
        let mut text = to_text(value.clone());
        for formatter in &self.formatters {
            formatter.format(&mut text);
        }
        Value::String(text)
    }

    fn blank_value(&self, _page: &Page, _field: &Field) -> Value {
        Value::String(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entities_formatter_encodes_markup() {
        let formatter = TextformatterEntities;
        let mut text = "a < b & \"c\"".to_string();
        formatter.format(&mut text);
        assert_eq!(text, "a &lt; b &amp; &quot;c&quot;");

        let mut clean = "plain".to_string();
        formatter.format(&mut clean);
        assert_eq!(clean, "plain");
    }
}
