//! Selector string parsing.
//!
//! Selectors are comma-separated `field op value` clauses used by the
//! page store's find() and by Page's children/child/siblings shorthand,
//! e.g. `parent_id=1, sort=-created, limit=10`.

use crate::error::{WireError, WireResult};

/// Comparison operator within one selector clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    GreaterThanEquals,
    LessThanEquals,
    /// Substring match (`%=`).
    Contains,
}

impl Operator {
    fn parse(s: &str) -> Option<(Operator, usize)> {
        // two-char operators first
        for (text, op) in [
            ("!=", Operator::NotEquals),
            (">=", Operator::GreaterThanEquals),
            ("<=", Operator::LessThanEquals),
            ("%=", Operator::Contains),
        ] {
            if let Some(pos) = s.find(text) {
                return Some((op, pos));
            }
        }
        for (text, op) in [
            ("=", Operator::Equals),
            (">", Operator::GreaterThan),
            ("<", Operator::LessThan),
        ] {
            if let Some(pos) = s.find(text) {
                return Some((op, pos));
            }
        }
        None
    }
}

/// A single `field op value` clause.
#[derive(Debug, Clone)]
pub struct Selector {
    pub field: String,
    pub operator: Operator,
    pub value: String,
}

impl Selector {
    /// Evaluate this clause against a concrete value. Numeric comparison
    /// is used when both sides parse as numbers, string comparison
    /// otherwise.
    pub fn matches(&self, value: &str) -> bool {
        if let (Ok(a), Ok(b)) = (value.parse::<f64>(), self.value.parse::<f64>()) {
            return match self.operator {
                Operator::Equals => a == b,
                Operator::NotEquals => a != b,
                Operator::GreaterThan => a > b,
                Operator::LessThan => a < b,
                Operator::GreaterThanEquals => a >= b,
                Operator::LessThanEquals => a <= b,
                Operator::Contains => value.contains(&self.value),
            };
        }
        match self.operator {
            Operator::Equals => value == self.value,
            Operator::NotEquals => value != self.value,
            Operator::GreaterThan => value > self.value.as_str(),
            Operator::LessThan => value < self.value.as_str(),
            Operator::GreaterThanEquals => value >= self.value.as_str(),
            Operator::LessThanEquals => value <= self.value.as_str(),
            Operator::Contains => value.contains(&self.value),
        }
    }
}

/// A parsed selector string.
#[derive(Debug, Clone, Default)]
pub struct Selectors {
    items: Vec<Selector>,
}

impl Selectors {
    /// Does the string contain a selector operator? Used to tell a plain
    /// field name apart from a find() shorthand.
    pub fn string_has_operator(s: &str) -> bool {
        Operator::parse(s).is_some()
    }

    pub fn parse(selector: &str) -> WireResult<Self> {
        let mut items = Vec::new();
        for clause in selector.split(',') {
            let clause = clause.trim();
            if clause.is_empty() {
                continue;
            }
            let (operator, pos) = Operator::parse(clause).ok_or_else(|| {
                WireError::Validation(format!("Selector clause has no operator: '{}'", clause))
            })?;
            let field = clause[..pos].trim();
            let op_len = match operator {
                Operator::Equals | Operator::GreaterThan | Operator::LessThan => 1,
                _ => 2,
            };
            let value = clause[pos + op_len..].trim();
            if field.is_empty() {
                return Err(WireError::Validation(format!(
                    "Selector clause has no field: '{}'",
                    clause
                )));
            }
            items.push(Selector {
                field: field.to_string(),
                operator,
                value: value.to_string(),
            });
        }
        Ok(Selectors { items })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Selector> {
        self.items.iter()
    }

    /// First clause for the given field, if present.
    pub fn get(&self, field: &str) -> Option<&Selector> {
        self.items.iter().find(|s| s.field == field)
    }

    pub fn push(&mut self, field: &str, operator: Operator, value: impl Into<String>) {
        self.items.push(Selector {
            field: field.to_string(),
            operator,
            value: value.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clauses() {
        let s = Selectors::parse("parent_id=1, sort=-created, limit=10").unwrap();
        assert_eq!(s.iter().count(), 3);
        let limit = s.get("limit").unwrap();
        assert_eq!(limit.operator, Operator::Equals);
        assert_eq!(limit.value, "10");
    }

    #[test]
    fn detects_operators() {
        assert!(Selectors::string_has_operator("title=hello"));
        assert!(Selectors::string_has_operator("sort>=3"));
        assert!(!Selectors::string_has_operator("title"));
        assert!(!Selectors::string_has_operator("headline|title"));
    }

    #[test]
    fn numeric_and_string_matching() {
        let s = Selectors::parse("sort>=2").unwrap();
        let sel = s.get("sort").unwrap();
        assert!(sel.matches("10"));
        assert!(!sel.matches("1"));

        let s = Selectors::parse("title%=ell").unwrap();
        assert!(s.get("title").unwrap().matches("hello"));
    }

    #[test]
    fn rejects_bare_words() {
        assert!(Selectors::parse("title").is_err());
    }
}
