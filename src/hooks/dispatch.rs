//! Hook dispatch.
//!
//! `Hookable` is the interception seam: a type exposes its canonical-call
//! table (`has_canonical`/`call_canonical`), its local hook bucket, and
//! its class chain, and gets the full add/remove/run contract as provided
//! methods. Class-wide buckets live in the application context, so a hook
//! registered against a base class name applies to every instance whose
//! chain includes that class.

use std::cell::RefCell;

use serde_json::Value;

use crate::context::WireContext;
use crate::error::{WireError, WireResult};
use crate::hooks::registry::{
    cache_signature, insert_record, HookBucket, HookEvent, HookFn, HookId, HookKind, HookOptions,
    HookWhen,
};

/// Outcome of one dispatch.
#[derive(Debug, Clone)]
pub struct HookRun {
    pub return_value: Value,
    /// Number of hook handlers that actually ran.
    pub hooks_run: usize,
    /// Whether a canonical implementation existed for the method.
    pub method_exists: bool,
}

pub trait Hookable {
    /// Class name used for class-wide hook targeting.
    fn hook_class(&self) -> &'static str;

    /// Full class chain, most-derived first, ending with the shared base
    /// "Wire". A class-wide hook applies when its class appears here.
    fn hook_classes(&self) -> &'static [&'static str];

    fn context(&self) -> &WireContext;

    /// Bucket of hooks scoped to this instance only.
    fn local_hooks(&self) -> &RefCell<HookBucket>;

    /// Instance id for event correlation.
    fn hook_object_id(&self) -> u64;

    /// Does the canonical-call table contain this method?
    fn has_canonical(&self, _method: &str) -> bool {
        false
    }

    /// Run the canonical implementation of a hookable method.
    /// Only called for methods where `has_canonical` is true.
    fn call_canonical(&mut self, method: &str, _arguments: &[Value]) -> WireResult<Value> {
        Err(WireError::UnknownMethod(format!(
            "{}::{} has no canonical implementation",
            self.hook_class(),
            method
        )))
    }

    /// Concrete methods of this type that are not routed through dispatch
    /// and therefore cannot be hooked.
    fn concrete_methods(&self) -> &'static [&'static str] {
        &[]
    }

    /// Register a hook on a method or property.
    ///
    /// The method spec may carry an explicit owning-class qualifier
    /// (`Class::method`), which forces the record into that class-wide
    /// bucket regardless of the `all_instances` option.
    fn add_hook(&self, method: &str, handler: HookFn, mut options: HookOptions) -> WireResult<HookId> {
        if method.starts_with("__") {
            return Err(WireError::InvalidHook(
                "Hookable methods must be specified without the internal prefix".to_string(),
            ));
        }
        let method = match method.split_once("::") {
            Some((class, name)) => {
                options.from_class = Some(class.to_string());
                name
            }
            None => method,
        };
        if self.concrete_methods().contains(&method) {
            return Err(WireError::InvalidHook(format!(
                "Method {}::{} is not hookable",
                self.hook_class(),
                method
            )));
        }

        let signature = cache_signature(method, options.kind);
        let id = if options.all_instances || options.from_class.is_some() {
            let class = options
                .from_class
                .clone()
                .unwrap_or_else(|| self.hook_class().to_string());
            self.context().add_class_hook(&class, method, handler, options)
        } else {
            insert_record(&mut self.local_hooks().borrow_mut(), None, method, handler, options)
        };
        self.context().cache_hook_signature(signature);
        tracing::debug!(id = %id, method, "hook added");
        Ok(id)
    }

    fn add_hook_before(&self, method: &str, handler: HookFn, mut options: HookOptions) -> WireResult<HookId> {
        options.before = true;
        options.after = false;
        self.add_hook(method, handler, options)
    }

    fn add_hook_after(&self, method: &str, handler: HookFn, mut options: HookOptions) -> WireResult<HookId> {
        options.after = true;
        options.before = false;
        self.add_hook(method, handler, options)
    }

    fn add_hook_property(&self, property: &str, handler: HookFn, mut options: HookOptions) -> WireResult<HookId> {
        options.kind = HookKind::Property;
        self.add_hook(property, handler, options)
    }

    /// Remove a previously registered hook. The id encodes which bucket
    /// holds the record. The existence cache is left as-is: dispatch may
    /// still pay the lookup cost, but the record will not execute.
    fn remove_hook(&self, id: &HookId) {
        match &id.class {
            Some(class) => self.context().remove_class_hook(class, id.priority),
            None => {
                self.local_hooks().borrow_mut().remove(&id.priority);
            }
        }
    }

    /// Run all applicable hooks around the canonical implementation.
    ///
    /// Execution order: before-group ascending priority, canonical call,
    /// after-group ascending priority. Before hooks may mutate arguments;
    /// after hooks may rewrite the return value (last writer wins).
    fn run_hooks(&mut self, method: &str, arguments: Vec<Value>, kind: HookKind) -> WireResult<HookRun> {
        let mut run = HookRun {
            return_value: Value::Null,
            hooks_run: 0,
            method_exists: false,
        };
        if kind == HookKind::Method {
            run.method_exists = self.has_canonical(method);
        }
        // Exit quickly when nothing can possibly apply. The existence
        // cache never shrinks, so a stale positive only costs the record
        // scan below.
        if !run.method_exists && !self.context().is_hooked(&cache_signature(method, kind)) {
            return Ok(run);
        }

        let mut records: Vec<(i64, HookFn, HookOptions, HookId)> = Vec::new();
        {
            let local = self.local_hooks().borrow();
            for record in local.values() {
                if record.method == method {
                    records.push((
                        record.options.priority,
                        record.handler.clone(),
                        record.options.clone(),
                        record.id.clone(),
                    ));
                }
            }
        }
        self.context().collect_class_hooks(self.hook_classes(), method, &mut records);
        records.sort_by_key(|(priority, ..)| *priority);

        let mut event = HookEvent {
            object_class: self.hook_class(),
            object_id: self.hook_object_id(),
            method: method.to_string(),
            arguments,
            when: HookWhen::Before,
            return_value: Value::Null,
            hook_id: None,
        };

        for (_, handler, options, id) in &records {
            if !options.before {
                continue;
            }
            event.when = HookWhen::Before;
            event.hook_id = Some(id.clone());
            handler(&mut event)?;
            run.hooks_run += 1;
        }

        // return flow starts at the canonical call; anything a before
        // hook wrote into the return value is discarded
        event.return_value = Value::Null;
        if run.method_exists {
            event.return_value = self.call_canonical(method, &event.arguments)?;
        }

        for (_, handler, options, id) in &records {
            if !options.after {
                continue;
            }
            event.when = HookWhen::After;
            event.hook_id = Some(id.clone());
            handler(&mut event)?;
            run.hooks_run += 1;
        }

        run.return_value = event.return_value;
        if run.hooks_run > 0 {
            tracing::trace!(method, hooks_run = run.hooks_run, "hooks dispatched");
        }
        Ok(run)
    }

    /// Dispatch a method call that has no direct implementation.
    ///
    /// Fails with `UnknownMethod` when neither a canonical implementation
    /// nor any hook matched; with hooks but no canonical method, the hook
    /// chain alone supplies the return value, which is how wholly new
    /// methods get attached to a class.
    fn call(&mut self, method: &str, arguments: Vec<Value>) -> WireResult<Value> {
        let run = self.run_hooks(method, arguments, HookKind::Method)?;
        if !run.method_exists && run.hooks_run == 0 {
            return Err(WireError::UnknownMethod(format!(
                "Method {}::{} does not exist or is not callable in this context",
                self.hook_class(),
                method
            )));
        }
        Ok(run.return_value)
    }

    /// Property-style dispatch for a bare attribute access. The context
    /// registry answers first, then property hooks run. Returns None when
    /// neither resolved the name.
    fn get_property(&mut self, name: &str) -> WireResult<Option<Value>> {
        if let Some(value) = self.context().fuel(name) {
            return Ok(Some(value));
        }
        let run = self.run_hooks(name, Vec::new(), HookKind::Property)?;
        if run.hooks_run == 0 {
            return Ok(None);
        }
        Ok(Some(run.return_value))
    }
}
