//! The page store collaborator.
//!
//! `PageStore` is the seam between the `Page` entity and whatever holds
//! pages at rest; `MemoryPages` is the in-process reference
//! implementation and doubles as the test double. Listing queries go
//! through parsed `Selectors` and by default exclude pages carrying any
//! status flag of `STATUS_HIDDEN` or above.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;

use chrono::Utc;
use serde_json::Value;

use crate::error::{WireError, WireResult};
use crate::page::{Page, PageRef};
use crate::selectors::{Selector, Selectors};

pub trait PageStore {
    fn get(&self, id: u32) -> Option<PageRef>;

    /// Pages matching the selectors, in selector sort order.
    fn find(&self, selectors: &Selectors) -> WireResult<Vec<PageRef>>;

    fn find_one(&self, selectors: &Selectors) -> WireResult<Option<PageRef>> {
        Ok(self.find(selectors)?.into_iter().next())
    }

    /// Persist the page: assign an id when new, stamp timestamps and
    /// users, settle relation bookkeeping, reset change tracking.
    fn save(&self, page: &PageRef) -> WireResult<()>;

    /// Permanently remove the page from the store. The entity survives in
    /// memory with the runtime deleted flag set.
    fn delete(&self, page: &PageRef) -> WireResult<()>;

    /// Move the page to the trash: flag it and reparent it under the
    /// configured trash page, then save.
    fn trash(&self, page: &PageRef) -> WireResult<()>;
}

/// Decodes symbolic sortfield names to their storage representation.
pub struct Sortfields;

impl Sortfields {
    /// A sortfield is a native or custom field name with an optional
    /// leading `-` for descending order. Anything that is not a plausible
    /// field name decodes to the default `sort`.
    pub fn decode(name: &str) -> String {
        let (base, descending) = match name.trim().strip_prefix('-') {
            Some(rest) => (rest, true),
            None => (name.trim(), false),
        };
        let valid = !base.is_empty()
            && base
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
            && !base.starts_with(|c: char| c.is_ascii_digit());
        if !valid {
            return "sort".to_string();
        }
        if descending {
            format!("-{}", base)
        } else {
            base.to_string()
        }
    }
}

pub struct MemoryPages {
    pages: RefCell<HashMap<u32, PageRef>>,
    next_id: Cell<u32>,
}

impl MemoryPages {
    pub fn new() -> Self {
        Self {
            pages: RefCell::new(HashMap::new()),
            next_id: Cell::new(1),
        }
    }

    pub fn count(&self) -> usize {
        self.pages.borrow().len()
    }

    fn allocate_id(&self) -> u32 {
        let max = self.pages.borrow().keys().copied().max().unwrap_or(0);
        let id = self.next_id.get().max(max + 1);
        self.next_id.set(id + 1);
        id
    }
}

impl Default for MemoryPages {
    fn default() -> Self {
        Self::new()
    }
}

/// Status bits a listing query skips for the given `include=` choice.
fn excluded_status_mask(include: Option<&str>, status_named: bool) -> u32 {
    if status_named {
        return 0;
    }
    match include {
        Some("all") => 0,
        Some("hidden") => Page::STATUS_UNPUBLISHED | Page::STATUS_TRASH | Page::STATUS_DELETED,
        Some("unpublished") => Page::STATUS_TRASH | Page::STATUS_DELETED,
        _ => {
            Page::STATUS_HIDDEN
                | Page::STATUS_UNPUBLISHED
                | Page::STATUS_TRASH
                | Page::STATUS_DELETED
        }
    }
}

fn match_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => (if *b { "1" } else { "0" }).to_string(),
        other => other.to_string(),
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    if let (Some(a), Some(b)) = (a.as_f64(), b.as_f64()) {
        return a.partial_cmp(&b).unwrap_or(Ordering::Equal);
    }
    match_string(a).cmp(&match_string(b))
}

fn sort_pages(pages: &mut [PageRef], sortfield: &str) {
    let (field, descending) = match sortfield.strip_prefix('-') {
        Some(rest) => (rest, true),
        None => (sortfield, false),
    };
    pages.sort_by(|a, b| {
        let (va, ia) = match a.try_borrow() {
            Ok(p) => (p.peek(field), p.id()),
            Err(_) => (Value::Null, 0),
        };
        let (vb, ib) = match b.try_borrow() {
            Ok(p) => (p.peek(field), p.id()),
            Err(_) => (Value::Null, 0),
        };
        let order = compare_values(&va, &vb).then(ia.cmp(&ib));
        if descending {
            order.reverse()
        } else {
            order
        }
    });
}

fn page_matches(page: &Page, clauses: &[&Selector]) -> bool {
    clauses.iter().all(|clause| {
        if clause.field == "has_parent" {
            // transitive ancestry by id
            return page
                .parents()
                .iter()
                .filter_map(|p| p.try_borrow().ok())
                .any(|p| clause.matches(&p.id().to_string()));
        }
        clause.matches(&match_string(&page.peek(&clause.field)))
    })
}

impl PageStore for MemoryPages {
    fn get(&self, id: u32) -> Option<PageRef> {
        self.pages.borrow().get(&id).cloned()
    }

    fn find(&self, selectors: &Selectors) -> WireResult<Vec<PageRef>> {
        let mut limit: Option<usize> = None;
        let mut sort: Option<String> = None;
        let mut include: Option<String> = None;
        let mut status_named = false;
        let mut clauses: Vec<&Selector> = Vec::new();

        for selector in selectors.iter() {
            match selector.field.as_str() {
                "limit" => limit = selector.value.parse().ok(),
                "sort" => sort = Some(Sortfields::decode(&selector.value)),
                "include" => include = Some(selector.value.clone()),
                field => {
                    if field == "status" {
                        status_named = true;
                    }
                    clauses.push(selector);
                }
            }
        }
        let excluded = excluded_status_mask(include.as_deref(), status_named);

        let mut results: Vec<PageRef> = Vec::new();
        {
            let map = self.pages.borrow();
            for page in map.values() {
                let p = match page.try_borrow() {
                    Ok(p) => p,
                    // a page currently being mutated cannot match
                    Err(_) => continue,
                };
                if p.status() & excluded != 0 {
                    continue;
                }
                if page_matches(&p, &clauses) {
                    results.push(page.clone());
                }
            }
        }

        sort_pages(&mut results, sort.as_deref().unwrap_or("sort"));
        if let Some(limit) = limit {
            results.truncate(limit);
        }
        Ok(results)
    }

    fn save(&self, page: &PageRef) -> WireResult<()> {
        let mut p = page.try_borrow_mut().map_err(|_| {
            WireError::Validation("Page is borrowed elsewhere and cannot be saved".to_string())
        })?;

        if p.template().is_none() {
            return Err(WireError::Schema(
                "Page has no template assigned and cannot be saved".to_string(),
            ));
        }
        if p.has_status(Page::STATUS_CORRUPTED) {
            return Err(WireError::Validation(format!(
                "Page {} was written a formatted field value and is flagged corrupted; refusing to save",
                p.id()
            )));
        }
        if p.output_formatting() {
            return Err(WireError::Validation(format!(
                "Page {} has output formatting on; turn it off before saving",
                p.id()
            )));
        }
        if p.name().is_empty() {
            return Err(WireError::Validation(
                "Page has no name and cannot be saved".to_string(),
            ));
        }

        let is_new = p.is_new();
        let now = Utc::now().timestamp();
        let was_tracking = p.track_changes();
        p.set_track_changes(false);

        if is_new || p.id() == 0 {
            let id = self.allocate_id();
            p.set("id", Value::from(id))?;
            p.set_created_raw(now);
        }
        p.set_modified_raw(now);
        if let Ok(identity) = p.ctx().identity() {
            p.stamp_users(identity.current_user());
        }
        p.prune_fields_for_template_change();
        p.set_track_changes(was_tracking);

        // parent child-count bookkeeping; the previous parent was recorded
        // when the page got reparented after load
        let parent = p.parent();
        let parent_previous = p.parent_previous();
        if is_new {
            if let Some(parent) = &parent {
                if let Ok(mut parent) = parent.try_borrow_mut() {
                    let count = parent.num_children() + 1;
                    parent.set_num_children_raw(count);
                }
            }
        } else if parent_previous.is_some() {
            if let Some(previous) = &parent_previous {
                if let Ok(mut previous) = previous.try_borrow_mut() {
                    let count = previous.num_children().saturating_sub(1);
                    previous.set_num_children_raw(count);
                }
            }
            if let Some(parent) = &parent {
                if let Ok(mut parent) = parent.try_borrow_mut() {
                    let count = parent.num_children() + 1;
                    parent.set_num_children_raw(count);
                }
            }
        }
        p.clear_parent_previous();
        p.set_is_new(false);
        p.reset_track_changes(true);
        let id = p.id();
        drop(p);

        self.pages.borrow_mut().insert(id, page.clone());
        tracing::debug!(id, new = is_new, "page saved");
        Ok(())
    }

    fn delete(&self, page: &PageRef) -> WireResult<()> {
        let mut p = page.try_borrow_mut().map_err(|_| {
            WireError::Validation("Page is borrowed elsewhere and cannot be deleted".to_string())
        })?;
        if p.has_status(Page::STATUS_LOCKED) {
            return Err(WireError::Validation(format!(
                "Page {} is locked and may not be deleted",
                p.id()
            )));
        }
        if p.num_children() > 0 {
            return Err(WireError::Validation(format!(
                "Page {} has children and may not be deleted",
                p.id()
            )));
        }
        p.add_status(Page::STATUS_DELETED)?;
        if let Some(parent) = p.parent() {
            if let Ok(mut parent) = parent.try_borrow_mut() {
                let count = parent.num_children().saturating_sub(1);
                parent.set_num_children_raw(count);
            }
        }
        let id = p.id();
        drop(p);

        self.pages.borrow_mut().remove(&id);
        tracing::debug!(id, "page deleted");
        Ok(())
    }

    fn trash(&self, page: &PageRef) -> WireResult<()> {
        let trash_id = page
            .try_borrow()
            .map_err(|_| {
                WireError::Validation("Page is borrowed elsewhere and cannot be trashed".to_string())
            })?
            .ctx()
            .config
            .trash_page_id;
        let trash_page = self.get(trash_id).ok_or_else(|| {
            WireError::NotFound(format!("No trash page with id {} in the store", trash_id))
        })?;
        if Rc::ptr_eq(&trash_page, page) {
            return Err(WireError::Validation(
                "The trash page itself may not be trashed".to_string(),
            ));
        }
        {
            let mut p = page.try_borrow_mut().map_err(|_| {
                WireError::Validation("Page is borrowed elsewhere and cannot be trashed".to_string())
            })?;
            p.add_status(Page::STATUS_TRASH)?;
            p.set_parent(trash_page)?;
        }
        self.save(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_sortfields() {
        assert_eq!(Sortfields::decode("name"), "name");
        assert_eq!(Sortfields::decode("-created"), "-created");
        assert_eq!(Sortfields::decode("counter_2"), "counter_2");
        assert_eq!(Sortfields::decode(""), "sort");
        assert_eq!(Sortfields::decode("DROP TABLE"), "sort");
        assert_eq!(Sortfields::decode("-9lives"), "sort");
    }

    #[test]
    fn status_masks() {
        assert_eq!(excluded_status_mask(None, true), 0);
        assert_eq!(excluded_status_mask(Some("all"), false), 0);
        let default_mask = excluded_status_mask(None, false);
        assert!(default_mask & Page::STATUS_HIDDEN != 0);
        let hidden_ok = excluded_status_mask(Some("hidden"), false);
        assert!(hidden_ok & Page::STATUS_HIDDEN == 0);
        assert!(hidden_ok & Page::STATUS_UNPUBLISHED != 0);
    }
}
