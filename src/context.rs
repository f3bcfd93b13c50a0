//! The application context.
//!
//! One `WireContext` exists per request/process and is passed as
//! `Rc<WireContext>` to every component at construction. It replaces any
//! notion of process-wide shared state: class-wide hook buckets, the hook
//! existence cache, the live page-instance debug map, the notice sink,
//! and the collaborator registry (pages, templates, fields, identity) all
//! live here. Single-threaded by design; interior mutability only.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use once_cell::unsync::OnceCell;
use serde_json::Value;

use crate::config::Config;
use crate::error::{WireError, WireResult};
use crate::hooks::registry::{insert_record, HookBucket, HookFn, HookId, HookOptions};
use crate::notices::Notices;
use crate::pages::PageStore;
use crate::sanitize::Sanitizer;
use crate::schema::{Fields, Templates};
use crate::users::IdentityStore;

pub struct WireContext {
    pub config: Config,
    pub sanitizer: Sanitizer,
    /// Class-wide hook buckets, applicable to all instances of a class.
    class_hooks: RefCell<HashMap<String, HookBucket>>,
    /// Monotonic set of hooked method/property signatures. Never shrinks,
    /// not even on hook removal; only an existence index for dispatch.
    hook_signatures: RefCell<HashSet<String>>,
    /// Live entity instances, instance id -> page id. Debugging aid for
    /// spotting instances that were never dropped.
    instances: RefCell<HashMap<u64, u32>>,
    next_instance_id: Cell<u64>,
    pages: OnceCell<Rc<dyn PageStore>>,
    templates: OnceCell<Rc<Templates>>,
    fields: OnceCell<Rc<Fields>>,
    identity: OnceCell<Rc<dyn IdentityStore>>,
    pub notices: RefCell<Notices>,
}

impl WireContext {
    pub fn new(config: Config) -> Rc<Self> {
        Rc::new(Self {
            config,
            sanitizer: Sanitizer::new(),
            class_hooks: RefCell::new(HashMap::new()),
            hook_signatures: RefCell::new(HashSet::new()),
            instances: RefCell::new(HashMap::new()),
            next_instance_id: Cell::new(1),
            pages: OnceCell::new(),
            templates: OnceCell::new(),
            fields: OnceCell::new(),
            identity: OnceCell::new(),
            notices: RefCell::new(Notices::new()),
        })
    }

    // --- collaborator registry ---

    pub fn install_pages(&self, pages: Rc<dyn PageStore>) {
        let _ = self.pages.set(pages);
    }

    pub fn install_templates(&self, templates: Rc<Templates>) {
        let _ = self.templates.set(templates);
    }

    pub fn install_fields(&self, fields: Rc<Fields>) {
        let _ = self.fields.set(fields);
    }

    pub fn install_identity(&self, identity: Rc<dyn IdentityStore>) {
        let _ = self.identity.set(identity);
    }

    pub fn pages(&self) -> WireResult<Rc<dyn PageStore>> {
        self.pages
            .get()
            .cloned()
            .ok_or_else(|| WireError::NotFound("No page store installed in context".to_string()))
    }

    pub fn templates(&self) -> WireResult<Rc<Templates>> {
        self.templates
            .get()
            .cloned()
            .ok_or_else(|| WireError::NotFound("No template registry installed in context".to_string()))
    }

    pub fn fields(&self) -> WireResult<Rc<Fields>> {
        self.fields
            .get()
            .cloned()
            .ok_or_else(|| WireError::NotFound("No field registry installed in context".to_string()))
    }

    pub fn identity(&self) -> WireResult<Rc<dyn IdentityStore>> {
        self.identity
            .get()
            .cloned()
            .ok_or_else(|| WireError::NotFound("No identity store installed in context".to_string()))
    }

    /// Resolve a registry name to a representable value: the serialized
    /// config, or a marker naming an installed collaborator. Property
    /// dispatch consults this before running any hooks.
    pub fn fuel(&self, name: &str) -> Option<Value> {
        let installed = match name {
            "config" => return serde_json::to_value(&self.config).ok(),
            "sanitizer" => true,
            "pages" => self.pages.get().is_some(),
            "templates" => self.templates.get().is_some(),
            "fields" => self.fields.get().is_some(),
            "users" => self.identity.get().is_some(),
            _ => false,
        };
        if installed {
            Some(Value::String(name.to_string()))
        } else {
            None
        }
    }

    // --- class-wide hooks ---

    pub(crate) fn add_class_hook(
        &self,
        class: &str,
        method: &str,
        handler: HookFn,
        options: HookOptions,
    ) -> HookId {
        let mut buckets = self.class_hooks.borrow_mut();
        let bucket = buckets.entry(class.to_string()).or_default();
        insert_record(bucket, Some(class.to_string()), method, handler, options)
    }

    pub(crate) fn remove_class_hook(&self, class: &str, priority: i64) {
        if let Some(bucket) = self.class_hooks.borrow_mut().get_mut(class) {
            bucket.remove(&priority);
        }
    }

    /// Append every class-wide record matching the method whose class
    /// appears in the given chain.
    pub(crate) fn collect_class_hooks(
        &self,
        classes: &[&str],
        method: &str,
        out: &mut Vec<(i64, HookFn, HookOptions, HookId)>,
    ) {
        let buckets = self.class_hooks.borrow();
        for class in classes {
            if let Some(bucket) = buckets.get(*class) {
                for record in bucket.values() {
                    if record.method == method {
                        out.push((
                            record.options.priority,
                            record.handler.clone(),
                            record.options.clone(),
                            record.id.clone(),
                        ));
                    }
                }
            }
        }
    }

    pub(crate) fn cache_hook_signature(&self, signature: String) {
        self.hook_signatures.borrow_mut().insert(signature);
    }

    /// Is the method/property signature possibly hooked? May answer yes
    /// for hooks that have since been removed.
    pub fn is_hooked(&self, signature: &str) -> bool {
        self.hook_signatures.borrow().contains(signature)
    }

    // --- live instance registry ---

    pub(crate) fn register_instance(&self, page_id: u32) -> u64 {
        let id = self.next_instance_id.get();
        self.next_instance_id.set(id + 1);
        self.instances.borrow_mut().insert(id, page_id);
        id
    }

    pub(crate) fn update_instance(&self, instance_id: u64, page_id: u32) {
        self.instances.borrow_mut().insert(instance_id, page_id);
    }

    pub(crate) fn unregister_instance(&self, instance_id: u64) {
        self.instances.borrow_mut().remove(&instance_id);
    }

    /// Number of entity instances currently alive.
    pub fn live_instances(&self) -> usize {
        self.instances.borrow().len()
    }
}
