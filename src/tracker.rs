//! Property change tracking.
//!
//! An append-only log of property names mutated while tracking is
//! enabled. Owners embed a `ChangeTracker` and call `record` from their
//! setters; mutations made while tracking is off (bulk/raw loads) leave
//! no trace by design. Owners that expose a hookable `changed`
//! notification fire it themselves after recording.

#[derive(Debug, Default, Clone)]
pub struct ChangeTracker {
    enabled: bool,
    changes: Vec<String>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Record a change to the named property. No-op while disabled.
    /// Returns whether the change was recorded, so the owner knows
    /// whether to fire its changed-notification.
    pub fn record(&mut self, name: &str) -> bool {
        if !self.enabled {
            return false;
        }
        self.changes.push(name.to_string());
        true
    }

    /// Was any change recorded?
    pub fn any(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Was the named property recorded?
    pub fn contains(&self, name: &str) -> bool {
        self.changes.iter().any(|c| c == name)
    }

    /// Ordered list of recorded property names.
    pub fn changes(&self) -> &[String] {
        &self.changes
    }

    /// Clear the log and re-apply the toggle in one step.
    pub fn reset(&mut self, enabled: bool) {
        self.changes.clear();
        self.enabled = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_only_while_enabled() {
        let mut tracker = ChangeTracker::new();
        assert!(!tracker.record("title"));
        assert!(!tracker.any());

        tracker.set_enabled(true);
        assert!(tracker.record("title"));
        assert!(tracker.record("name"));
        assert!(tracker.contains("title"));
        assert!(!tracker.contains("body"));
        assert_eq!(tracker.changes(), &["title".to_string(), "name".to_string()]);
    }

    #[test]
    fn reset_clears_and_toggles_atomically() {
        let mut tracker = ChangeTracker::new();
        tracker.set_enabled(true);
        tracker.record("title");
        tracker.reset(false);
        assert!(!tracker.any());
        assert!(!tracker.enabled());
        tracker.reset(true);
        assert!(tracker.enabled());
    }
}
