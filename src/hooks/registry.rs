//! Hook records and registry buckets.
//!
//! A hook is an interception record attached either to a single object
//! instance (local bucket, owned by the object) or to every instance of a
//! class (class-wide bucket, owned by the application context). Buckets
//! are keyed by effective priority; a priority collision bumps the new
//! record up until it finds a free slot, so records at equal nominal
//! priority execute in registration order.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use serde_json::Value;

use crate::error::{WireError, WireResult};

/// Whether a record responds to method dispatch, property access, or both.
///
/// Property-kind hooks also run on method dispatch; the kind only decides
/// which signature lands in the existence cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Method,
    Property,
}

/// Phase a hook handler is running in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookWhen {
    Before,
    After,
}

/// Registration options for a hook.
#[derive(Debug, Clone)]
pub struct HookOptions {
    pub kind: HookKind,
    /// Run before the canonical call. Before hooks may mutate arguments
    /// but never block the canonical call or touch its return value.
    pub before: bool,
    /// Run after the canonical call; may rewrite the return value.
    pub after: bool,
    /// Lower priorities execute first.
    pub priority: i64,
    /// Attach to every instance of the class rather than one object.
    pub all_instances: bool,
    /// Owning class when the hook targets a class other than the object's
    /// own, e.g. registered via a `Class::method` spec.
    pub from_class: Option<String>,
}

impl Default for HookOptions {
    fn default() -> Self {
        Self {
            kind: HookKind::Method,
            before: false,
            after: true,
            priority: 100,
            all_instances: false,
            from_class: None,
        }
    }
}

/// Identifier returned by add_hook, needed to remove the hook later.
///
/// Encodes which bucket the record lives in: a class name means the
/// class-wide bucket, no class means the registering object's local
/// bucket. Renders as `class:priority`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookId {
    pub class: Option<String>,
    pub priority: i64,
}

impl fmt::Display for HookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.class.as_deref().unwrap_or(""), self.priority)
    }
}

impl FromStr for HookId {
    type Err = WireError;

    fn from_str(s: &str) -> WireResult<Self> {
        let (class, priority) = s
            .split_once(':')
            .ok_or_else(|| WireError::InvalidHook(format!("Malformed hook id '{}'", s)))?;
        let priority = priority
            .parse()
            .map_err(|_| WireError::InvalidHook(format!("Malformed hook id '{}'", s)))?;
        Ok(HookId {
            class: if class.is_empty() { None } else { Some(class.to_string()) },
            priority,
        })
    }
}

/// Mutable view of one dispatch, handed to every hook handler.
///
/// Before handlers see the arguments prior to the canonical call and may
/// mutate them. After handlers see the current return value and may
/// replace it; the last writer wins.
#[derive(Debug, Clone)]
pub struct HookEvent {
    pub object_class: &'static str,
    /// Instance id of the dispatching object, for correlation.
    pub object_id: u64,
    pub method: String,
    pub arguments: Vec<Value>,
    pub when: HookWhen,
    pub return_value: Value,
    /// Id of the record currently running.
    pub hook_id: Option<HookId>,
}

pub type HookFn = Rc<dyn Fn(&mut HookEvent) -> WireResult<()>>;

/// One registered interception record.
#[derive(Clone)]
pub struct HookRecord {
    pub id: HookId,
    pub method: String,
    pub handler: HookFn,
    pub options: HookOptions,
}

impl fmt::Debug for HookRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRecord")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("options", &self.options)
            .finish()
    }
}

/// Records sorted by ascending effective priority.
pub type HookBucket = BTreeMap<i64, HookRecord>;

/// Insert a record into a bucket, bumping the priority past collisions.
/// Returns the effective priority.
pub(crate) fn insert_record(
    bucket: &mut HookBucket,
    class: Option<String>,
    method: &str,
    handler: HookFn,
    mut options: HookOptions,
) -> HookId {
    let mut priority = options.priority;
    while bucket.contains_key(&priority) {
        priority += 1;
    }
    options.priority = priority;
    let id = HookId { class, priority };
    bucket.insert(
        priority,
        HookRecord {
            id: id.clone(),
            method: method.to_string(),
            handler,
            options,
        },
    );
    id
}

/// Existence-cache signature for a registration: methods carry a call
/// marker, properties are bare.
pub(crate) fn cache_signature(method: &str, kind: HookKind) -> String {
    match kind {
        HookKind::Method => format!("{}()", method),
        HookKind::Property => method.to_string(),
    }
}
