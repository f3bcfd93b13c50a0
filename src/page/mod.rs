// Page entity - the node of the content hierarchy
//
// A Page combines a fixed settings set (id, name, status, parent,
// template, timestamps) with a dynamic field set resolved through its
// template's fieldgroup. Field values are serde_json Values with three
// views: raw storage form, woken in-memory form, and the formatted
// display form active while output formatting is on.

pub mod builder;

pub use builder::PageBuilder;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

use crate::context::WireContext;
use crate::error::{WireError, WireResult};
use crate::fieldtype::parse_timestamp;
use crate::hooks::{HookBucket, HookKind, Hookable};
use crate::pages::Sortfields;
use crate::schema::{HttpsMode, Template};
use crate::selectors::{Operator, Selectors};
use crate::tracker::ChangeTracker;
use crate::users::{Role, User};

pub type PageRef = Rc<RefCell<Page>>;

/// Fixed page settings, either persisted or generated at runtime.
#[derive(Debug, Clone)]
pub struct PageSettings {
    pub id: u32,
    pub name: String,
    pub status: u32,
    /// Cached parent id, kept in sync with the parent reference so that
    /// selector matching never needs to borrow the parent.
    pub parent_id: u32,
    pub num_children: u32,
    pub sort: u32,
    pub sortfield: String,
    pub created: i64,
    pub modified: i64,
}

impl Default for PageSettings {
    fn default() -> Self {
        Self {
            id: 0,
            name: String::new(),
            status: Page::STATUS_ON,
            parent_id: 0,
            num_children: 0,
            sort: 0,
            sortfield: "sort".to_string(),
            created: 0,
            modified: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UserSlot {
    Created,
    Modified,
}

pub struct Page {
    ctx: Rc<WireContext>,
    settings: PageSettings,
    template: Option<Rc<Template>>,
    /// Previous template, set only when changed after load, so the store
    /// can drop field data the new template no longer defines.
    template_previous: Option<Rc<Template>>,
    parent: Option<PageRef>,
    /// Previous parent, set only when reparented after load.
    parent_previous: Option<PageRef>,
    created_user: Option<Rc<User>>,
    modified_user: Option<Rc<User>>,
    /// Materialized dynamic field values plus runtime-only properties.
    data: HashMap<String, Value>,
    /// Compound sub-field fragments buffered while streaming a load;
    /// drained once by the builder's finalize step.
    field_data_queue: HashMap<String, HashMap<String, Value>>,
    is_new: bool,
    is_loaded: bool,
    output_formatting: bool,
    instance_id: u64,
    tracker: ChangeTracker,
    local_hooks: RefCell<HookBucket>,
}

impl Page {
    // Status flags, combined bitwise. Flags 1024 and above are excluded
    // from listing queries by default; flags 16384 and above are runtime
    // only and never persisted except for audit logging.
    pub const STATUS_ON: u32 = 1;
    pub const STATUS_LOCKED: u32 = 4;
    pub const STATUS_HIDDEN: u32 = 1024;
    pub const STATUS_UNPUBLISHED: u32 = 2048;
    pub const STATUS_TRASH: u32 = 8192;
    pub const STATUS_DELETED: u32 = 16384;
    pub const STATUS_CORRUPTED: u32 = 131072;
    pub const STATUS_MAX: u32 = 9999999;

    /// Create a new page in memory. It stays `is_new` until a page store
    /// explicitly clears that after the first save.
    pub fn new(ctx: &Rc<WireContext>, template: Option<Rc<Template>>) -> Self {
        let instance_id = ctx.register_instance(0);
        let mut tracker = ChangeTracker::new();
        tracker.set_enabled(true);
        Self {
            ctx: ctx.clone(),
            settings: PageSettings::default(),
            template,
            template_previous: None,
            parent: None,
            parent_previous: None,
            created_user: None,
            modified_user: None,
            data: HashMap::new(),
            field_data_queue: HashMap::new(),
            is_new: true,
            is_loaded: true,
            output_formatting: false,
            instance_id,
            tracker,
            local_hooks: RefCell::new(HookBucket::new()),
        }
    }

    pub fn new_ref(ctx: &Rc<WireContext>, template: Option<Rc<Template>>) -> PageRef {
        Rc::new(RefCell::new(Self::new(ctx, template)))
    }

    // --- settings accessors ---

    pub fn id(&self) -> u32 {
        self.settings.id
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    /// A page with no name is addressed by its id.
    pub fn name_or_id(&self) -> String {
        if self.settings.name.is_empty() {
            self.settings.id.to_string()
        } else {
            self.settings.name.clone()
        }
    }

    pub fn status(&self) -> u32 {
        self.settings.status
    }

    pub fn sort(&self) -> u32 {
        self.settings.sort
    }

    pub fn sortfield(&self) -> &str {
        &self.settings.sortfield
    }

    pub fn num_children(&self) -> u32 {
        self.settings.num_children
    }

    pub fn created(&self) -> i64 {
        self.settings.created
    }

    pub fn modified(&self) -> i64 {
        self.settings.modified
    }

    pub fn template(&self) -> Option<Rc<Template>> {
        self.template.clone()
    }

    pub fn template_previous(&self) -> Option<Rc<Template>> {
        self.template_previous.clone()
    }

    pub fn parent(&self) -> Option<PageRef> {
        self.parent.clone()
    }

    pub fn parent_previous(&self) -> Option<PageRef> {
        self.parent_previous.clone()
    }

    pub fn parent_id(&self) -> u32 {
        self.settings.parent_id
    }

    pub fn created_user(&self) -> Option<Rc<User>> {
        self.created_user.clone()
    }

    pub fn modified_user(&self) -> Option<Rc<User>> {
        self.modified_user.clone()
    }

    pub fn instance_id(&self) -> u64 {
        self.instance_id
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Cleared by the page store once the page exists in storage.
    pub fn set_is_new(&mut self, is_new: bool) {
        self.is_new = is_new;
    }

    pub fn is_loaded(&self) -> bool {
        self.is_loaded
    }

    pub fn output_formatting(&self) -> bool {
        self.output_formatting
    }

    /// Turn display formatting of field reads on or off. Pages being
    /// manipulated and saved should have it off; pages used for output
    /// should have it on.
    pub fn set_output_formatting(&mut self, on: bool) {
        self.output_formatting = on;
    }

    // --- change tracking ---

    pub fn track_changes(&self) -> bool {
        self.tracker.enabled()
    }

    pub fn set_track_changes(&mut self, on: bool) {
        self.tracker.set_enabled(on);
    }

    pub fn reset_track_changes(&mut self, on: bool) {
        self.tracker.reset(on);
    }

    pub fn changes(&self) -> &[String] {
        self.tracker.changes()
    }

    /// Has the page (or one named property) changed since load? New
    /// pages always report changed.
    pub fn is_changed(&self, what: &str) -> bool {
        if self.is_new {
            return true;
        }
        if what.is_empty() {
            self.tracker.any()
        } else {
            self.tracker.contains(what)
        }
    }

    /// Record a change and fire the hookable changed-notification.
    fn track_change(&mut self, what: &str) -> WireResult<()> {
        if self.tracker.record(what) {
            self.run_hooks("changed", vec![Value::String(what.to_string())], HookKind::Method)?;
        }
        Ok(())
    }

    // --- status ---

    pub fn has_status(&self, flag: u32) -> bool {
        self.settings.status & flag != 0
    }

    pub fn add_status(&mut self, flag: u32) -> WireResult<()> {
        let status = self.settings.status | flag;
        self.set("status", Value::from(status))
    }

    pub fn remove_status(&mut self, flag: u32) -> WireResult<()> {
        let status = self.settings.status & !flag;
        self.set("status", Value::from(status))
    }

    pub fn is_hidden(&self) -> bool {
        self.has_status(Self::STATUS_HIDDEN)
    }

    /// In the trash: either flagged, or the trash page itself, or below
    /// it (covers a page trashed but not yet saved).
    pub fn is_trash(&self) -> bool {
        if self.has_status(Self::STATUS_TRASH) {
            return true;
        }
        let trash_id = self.ctx.config.trash_page_id;
        if self.settings.id == trash_id {
            return true;
        }
        self.parents()
            .iter()
            .any(|p| p.try_borrow().map(|p| p.settings.id == trash_id).unwrap_or(false))
    }

    // --- set protocol ---

    /// Set a page property: fixed settings, relations, or a dynamic field.
    pub fn set(&mut self, key: &str, value: Value) -> WireResult<()> {
        match key {
            "id" => {
                let v = value_to_u32(&value);
                if self.settings.id != v {
                    self.track_change("id")?;
                }
                self.settings.id = v;
                self.ctx.update_instance(self.instance_id, v);
                Ok(())
            }
            "sort" => {
                let v = value_to_u32(&value);
                if self.settings.sort != v {
                    self.track_change("sort")?;
                }
                self.settings.sort = v;
                Ok(())
            }
            "status" => {
                let v = value_to_u32(&value);
                if self.settings.status != v {
                    self.track_change("status")?;
                }
                self.settings.status = v;
                Ok(())
            }
            "numChildren" | "num_children" => {
                let v = value_to_u32(&value);
                if self.settings.num_children != v {
                    self.track_change("numChildren")?;
                }
                self.settings.num_children = v;
                Ok(())
            }
            "name" => {
                let mut v = value_to_plain_string(&value);
                if self.is_loaded {
                    // not yet loaded means a trusted raw import, no sanitizing
                    let beautify = self.settings.name.is_empty();
                    v = self.ctx.sanitizer.page_name(&v, beautify);
                    if self.settings.name != v {
                        self.track_change("name")?;
                    }
                }
                self.settings.name = v;
                Ok(())
            }
            "parent" | "parent_id" => {
                let id = value_to_u32(&value);
                if id == 0 {
                    return Ok(());
                }
                let parent = self
                    .ctx
                    .pages()?
                    .get(id)
                    .ok_or_else(|| WireError::NotFound(format!("Unknown parent page {}", id)))?;
                self.set_parent(parent)
            }
            "template" | "templates_id" => {
                let templates = self.ctx.templates()?;
                let template = match &value {
                    Value::Number(n) => n.as_u64().and_then(|id| templates.get_by_id(id as u32)),
                    Value::String(s) => templates.get(s),
                    _ => None,
                }
                .ok_or_else(|| {
                    WireError::Validation(format!("Invalid template reference: {}", value))
                })?;
                self.set_template(template)
            }
            "created" | "modified" => {
                let ts = parse_timestamp(&value).ok_or_else(|| {
                    WireError::Validation(format!("Unparseable {} timestamp: {}", key, value))
                })?;
                if key == "created" {
                    self.settings.created = ts;
                } else {
                    self.settings.modified = ts;
                }
                Ok(())
            }
            "created_users_id" | "createdUser" => self.set_user(value, UserSlot::Created),
            "modified_users_id" | "modifiedUser" => self.set_user(value, UserSlot::Modified),
            "sortfield" => {
                let v = Sortfields::decode(&value_to_plain_string(&value));
                if self.settings.sortfield != v {
                    self.track_change("sortfield")?;
                }
                self.settings.sortfield = v;
                Ok(())
            }
            _ => self.set_field_value(key, value, self.is_loaded),
        }
    }

    pub fn set_parent(&mut self, parent: PageRef) -> WireResult<()> {
        let new_id = page_id_of(&parent)?;
        if let Some(current) = self.parent.clone() {
            let current_id = page_id_of(&current)?;
            if current_id == new_id {
                return Ok(());
            }
            self.track_change("parent")?;
            if current_id != 0 {
                self.parent_previous = Some(current);
            }
        } else {
            self.track_change("parent")?;
        }
        self.parent = Some(parent);
        self.settings.parent_id = new_id;
        Ok(())
    }

    pub fn set_template(&mut self, template: Rc<Template>) -> WireResult<()> {
        if let Some(current) = &self.template {
            if current.id != template.id {
                if self.template_previous.is_none() {
                    self.template_previous = Some(current.clone());
                }
                self.track_change("template")?;
            }
        }
        self.template = Some(template);
        Ok(())
    }

    fn set_user(&mut self, value: Value, slot: UserSlot) -> WireResult<()> {
        let identity = self.ctx.identity()?;
        // unknown or invalid references fall back to the guest user
        let user = match &value {
            Value::Number(n) => n.as_u64().and_then(|id| identity.user_by_id(id as u32)),
            Value::String(s) => identity.user_by_name(s),
            _ => None,
        }
        .unwrap_or_else(|| identity.guest());

        let (existing_id, what) = match slot {
            UserSlot::Created => (self.created_user.as_ref().map(|u| u.id), "createdUser"),
            UserSlot::Modified => (self.modified_user.as_ref().map(|u| u.id), "modifiedUser"),
        };
        if let Some(existing_id) = existing_id {
            if existing_id != user.id {
                self.track_change(what)?;
            }
        }
        match slot {
            UserSlot::Created => self.created_user = Some(user),
            UserSlot::Modified => self.modified_user = Some(user),
        }
        Ok(())
    }

    /// Set the value of a field defined in the page's fieldgroup.
    ///
    /// `load` asks for the existing stored value to be materialized first
    /// so later change comparison is meaningful. The API should normally
    /// go through set(); this stays public for the few callers that need
    /// the load switch.
    pub fn set_field_value(&mut self, key: &str, value: Value, load: bool) -> WireResult<()> {
        let template = self.template.clone().ok_or_else(|| {
            WireError::Schema(format!(
                "A template must be assigned to the page before setting custom field '{}'",
                key
            ))
        })?;

        // while streaming a load, compound sub-field values queue up so
        // the finalize step can wake each field with all its parts present
        if !self.is_loaded {
            if let Some((base, sub)) = key.split_once("__") {
                if !base.is_empty() && !sub.is_empty() {
                    self.field_data_queue
                        .entry(base.to_string())
                        .or_default()
                        .insert(sub.to_string(), value);
                    return Ok(());
                }
            }
        }

        let field = match template.fieldgroup.get_field(key) {
            // not a known/saveable field; keep it as runtime storage
            None => return self.raw_set_data(key, value),
            Some(field) => field,
        };

        // null gets the field-type's blank sentinel instead
        if value.is_null() {
            let blank = field.fieldtype.blank_value(self, &field);
            return self.raw_set_data(key, blank);
        }

        // values arriving before the load completes are raw and need waking
        if !self.is_loaded {
            let woken = field.fieldtype.wakeup_value(self, &field, value);
            return self.raw_set_data(key, woken);
        }

        if self.data.get(key).is_none() {
            if load {
                // materialize the stored value first so change comparison
                // and saves keep working for non-autoloaded fields
                self.get_field_value(key)?;
            }
        } else if self.output_formatting {
            // A materialized field whose value changes under formatting is
            // probably being assigned a formatted value back. Too high a
            // corruption risk to store; flag the page so a save aborts.
            let formatted = field.fieldtype.format_value(self, &field, &value);
            if formatted != value {
                let status = self.settings.status | Self::STATUS_CORRUPTED;
                self.set("status", Value::from(status))?;
            }
        }

        let value = field.fieldtype.sanitize_value(self, &field, value);
        self.raw_set_data(key, value)
    }

    fn raw_set_data(&mut self, key: &str, value: Value) -> WireResult<()> {
        if self.data.get(key).map_or(true, |v| v != &value) {
            self.track_change(key)?;
        }
        self.data.insert(key.to_string(), value);
        Ok(())
    }

    // --- get protocol ---

    /// Get a page property as a plain value.
    ///
    /// Resolution order: well-known derived accessors, fixed settings,
    /// multi-key shorthand (`a|b|c`: first non-empty), dynamic fields,
    /// and finally a selector treated as shorthand for a matching child
    /// (returned by id). Accessors that resolve to pages yield ids; use
    /// the typed methods (parent(), children(), ...) for the objects.
    pub fn get(&mut self, key: &str) -> WireResult<Value> {
        match key {
            "parent" | "parent_id" | "parentID" => Ok(Value::from(self.parent_id())),
            "child" => Ok(match self.child("")? {
                Some(child) => Value::from(page_id_of(&child)?),
                None => Value::Null,
            }),
            "children" | "subpages" => Ok(page_ids(&self.children("")?)),
            "parents" => Ok(page_ids(&self.parents())),
            "rootParent" => {
                let id = match self.root_parent() {
                    Some(root) => page_id_of(&root)?,
                    None => self.settings.id,
                };
                Ok(Value::from(id))
            }
            "siblings" => Ok(page_ids(&self.siblings("")?)),
            "roles" => Ok(Value::Array(
                self.roles()?
                    .iter()
                    .map(|r| Value::String(r.name.clone()))
                    .collect(),
            )),
            "path" => Ok(Value::String(self.path())),
            "url" => Ok(Value::String(self.url())),
            "httpUrl" | "httpURL" => Ok(Value::String(self.http_url())),
            "outputFormatting" => Ok(Value::Bool(self.output_formatting)),
            "isTrash" => Ok(Value::Bool(self.is_trash())),
            "isLoaded" => Ok(Value::Bool(self.is_loaded)),
            "isNew" => Ok(Value::Bool(self.is_new)),
            "template" => Ok(self
                .template
                .as_ref()
                .map(|t| Value::String(t.name.clone()))
                .unwrap_or(Value::Null)),
            "templatePrevious" => Ok(self
                .template_previous
                .as_ref()
                .map(|t| Value::String(t.name.clone()))
                .unwrap_or(Value::Null)),
            "parentPrevious" => Ok(match &self.parent_previous {
                Some(p) => Value::from(page_id_of(p)?),
                None => Value::Null,
            }),
            "fieldgroup" | "fields" => Ok(Value::Array(
                self.template
                    .iter()
                    .flat_map(|t| t.fieldgroup.iter())
                    .map(|f| Value::String(f.name.clone()))
                    .collect(),
            )),
            "name" => Ok(if self.settings.name.is_empty() {
                Value::from(self.settings.id)
            } else {
                Value::String(self.settings.name.clone())
            }),
            "created_users_id" | "createdUsersID" => Ok(self
                .created_user
                .as_ref()
                .map(|u| Value::from(u.id))
                .unwrap_or(Value::Null)),
            "modified_users_id" | "modifiedUsersID" => Ok(self
                .modified_user
                .as_ref()
                .map(|u| Value::from(u.id))
                .unwrap_or(Value::Null)),
            "createdUser" => Ok(self
                .created_user
                .as_ref()
                .map(|u| Value::String(u.name.clone()))
                .unwrap_or(Value::Null)),
            "modifiedUser" => Ok(self
                .modified_user
                .as_ref()
                .map(|u| Value::String(u.name.clone()))
                .unwrap_or(Value::Null)),
            "id" => Ok(Value::from(self.settings.id)),
            "sort" => Ok(Value::from(self.settings.sort)),
            "status" => Ok(Value::from(self.settings.status)),
            "numChildren" => Ok(Value::from(self.settings.num_children)),
            "sortfield" => Ok(Value::String(self.settings.sortfield.clone())),
            "created" => Ok(Value::from(self.settings.created)),
            "modified" => Ok(Value::from(self.settings.modified)),
            _ => {
                if let Some(value) = self.get_field_first_value(key)? {
                    return Ok(value);
                }
                if let Some(value) = self.get_field_value(key)? {
                    return Ok(value);
                }
                if Selectors::string_has_operator(key) {
                    if let Some(child) = self.child(key)? {
                        return Ok(Value::from(page_id_of(&child)?));
                    }
                }
                Ok(Value::Null)
            }
        }
    }

    /// Raw value of a field regardless of the output-formatting state.
    pub fn get_unformatted(&mut self, key: &str) -> WireResult<Value> {
        let formatting = self.output_formatting;
        self.output_formatting = false;
        let result = self.get(key);
        self.output_formatting = formatting;
        result
    }

    /// Multi-key shorthand: `headline|title` returns the first non-empty
    /// value among the candidates. Skipped when the string also looks
    /// like a selector.
    fn get_field_first_value(&mut self, multi_key: &str) -> WireResult<Option<Value>> {
        if !multi_key.contains('|') || multi_key.contains('=') {
            return Ok(None);
        }
        for key in multi_key.split('|') {
            if let Some(mut value) = self.get_field_value(key)? {
                if let Value::String(s) = &value {
                    value = Value::String(s.trim().to_string());
                }
                if value_is_truthy(&value) {
                    return Ok(Some(value));
                }
            }
        }
        Ok(None)
    }

    /// Value for a non-native field, pulling it from the field-type's
    /// storage backend on first access.
    fn get_field_value(&mut self, key: &str) -> WireResult<Option<Value>> {
        let template = match &self.template {
            None => return Ok(None),
            Some(t) => t.clone(),
        };
        let current = self.data.get(key).cloned();
        let field = match template.fieldgroup.get_field(key) {
            // likely a runtime property, not part of the schema
            None => return Ok(current),
            Some(field) => field,
        };

        if let Some(value) = current {
            return Ok(Some(if self.output_formatting {
                field.fieldtype.format_value(self, &field, &value)
            } else {
                value
            }));
        }

        // first access: load raw, wake up, store materialized. The store
        // round trip must not register as a change or re-format.
        let was_tracking = self.tracker.enabled();
        self.tracker.set_enabled(false);
        let raw = field.fieldtype.load_page_field(self, &field)?;
        let value = match raw {
            None => field.fieldtype.default_value(self, &field),
            Some(raw) => field.fieldtype.wakeup_value(self, &field, raw),
        };
        let formatting = self.output_formatting;
        self.output_formatting = false;
        let stored = self.set_field_value(key, value, false);
        self.output_formatting = formatting;
        self.tracker.set_enabled(was_tracking);
        stored?;

        let value = self.data.get(key).cloned().unwrap_or(Value::Null);
        Ok(Some(if self.output_formatting {
            field.fieldtype.format_value(self, &field, &value)
        } else {
            value
        }))
    }

    /// Read-only view used for selector matching and sorting: settings,
    /// relations by id, and already-materialized fields. Never triggers a
    /// lazy load.
    pub fn peek(&self, key: &str) -> Value {
        match key {
            "id" => Value::from(self.settings.id),
            "name" => Value::String(self.settings.name.clone()),
            "status" => Value::from(self.settings.status),
            "sort" => Value::from(self.settings.sort),
            "sortfield" => Value::String(self.settings.sortfield.clone()),
            "numChildren" | "num_children" => Value::from(self.settings.num_children),
            "created" => Value::from(self.settings.created),
            "modified" => Value::from(self.settings.modified),
            "parent_id" => Value::from(self.parent_id()),
            "template" => self
                .template
                .as_ref()
                .map(|t| Value::String(t.name.clone()))
                .unwrap_or(Value::Null),
            _ => self.data.get(key).cloned().unwrap_or(Value::Null),
        }
    }

    // --- hierarchy ---

    /// Ancestors ordered root-first.
    pub fn parents(&self) -> Vec<PageRef> {
        let mut parents: Vec<PageRef> = Vec::new();
        let mut current = self.parent.clone();
        while let Some(page) = current {
            if parents.iter().any(|p| Rc::ptr_eq(p, &page)) {
                break; // guard against parent cycles
            }
            let next = page.try_borrow().ok().and_then(|p| p.parent.clone());
            parents.insert(0, page);
            current = next;
        }
        parents
    }

    /// The below-homepage ancestor this page descends from, or None when
    /// the page itself is that ancestor (or the homepage).
    pub fn root_parent(&self) -> Option<PageRef> {
        let parent = self.parent.as_ref()?;
        if page_id_of(parent).ok()? == 1 {
            return None;
        }
        let mut parents = self.parents();
        if !parents.is_empty()
            && parents[0]
                .try_borrow()
                .map(|p| p.settings.id == 1)
                .unwrap_or(false)
        {
            parents.remove(0);
        }
        parents.into_iter().next()
    }

    /// Children filtered by an optional selector.
    pub fn children(&self, selector: &str) -> WireResult<Vec<PageRef>> {
        if self.settings.num_children == 0 {
            return Ok(Vec::new());
        }
        let mut selectors = Selectors::parse(selector)?;
        selectors.push("parent_id", Operator::Equals, self.settings.id.to_string());
        if selectors.get("sort").is_none() {
            selectors.push("sort", Operator::Equals, self.settings.sortfield.clone());
        }
        self.ctx.pages()?.find(&selectors)
    }

    /// First child matching the selector.
    pub fn child(&self, selector: &str) -> WireResult<Option<PageRef>> {
        let selector = if selector.is_empty() {
            "limit=1".to_string()
        } else {
            format!("{}, limit=1", selector)
        };
        Ok(self.children(&selector)?.into_iter().next())
    }

    /// Pages sharing this page's parent, this page included.
    pub fn siblings(&self, selector: &str) -> WireResult<Vec<PageRef>> {
        let mut selectors = Selectors::parse(selector)?;
        selectors.push("parent_id", Operator::Equals, self.parent_id().to_string());
        if selectors.get("sort").is_none() {
            let sortfield = self
                .parent
                .as_ref()
                .and_then(|p| p.try_borrow().ok().map(|p| p.settings.sortfield.clone()))
                .unwrap_or_else(|| "sort".to_string());
            selectors.push("sort", Operator::Equals, sortfield);
        }
        self.ctx.pages()?.find(&selectors)
    }

    /// Find pages in the descendant hierarchy matching the selector.
    pub fn find(&self, selector: &str) -> WireResult<Vec<PageRef>> {
        if self.settings.num_children == 0 {
            return Ok(Vec::new());
        }
        let mut s = format!("has_parent={}", self.settings.id);
        if !selector.is_empty() {
            s.push_str(", ");
            s.push_str(selector);
        }
        self.ctx.pages()?.find(&Selectors::parse(&s)?)
    }

    /// Path from the site root, e.g. `/about/contact/`.
    pub fn path(&self) -> String {
        if self.settings.id == 1 {
            return "/".to_string();
        }
        let mut path = String::new();
        for parent in self.parents() {
            if let Ok(parent) = parent.try_borrow() {
                if parent.settings.id > 1 {
                    path.push('/');
                    path.push_str(&parent.name_or_id());
                }
            }
        }
        format!("{}/{}/", path, self.name_or_id())
    }

    /// Like path() but from the server document root.
    pub fn url(&self) -> String {
        let root = self.ctx.config.http.root_url.trim_end_matches('/');
        format!("{}{}", root, self.path())
    }

    /// Like url() but with protocol and hostname.
    pub fn http_url(&self) -> String {
        let https = match self.template.as_ref().map(|t| t.https).unwrap_or_default() {
            HttpsMode::Force => true,
            HttpsMode::Never => false,
            HttpsMode::Inherit => self.ctx.config.http.https,
        };
        let protocol = if https { "https" } else { "http" };
        format!("{}://{}{}", protocol, self.ctx.config.http.host, self.url())
    }

    // --- roles ---

    pub fn roles(&self) -> WireResult<Vec<Rc<Role>>> {
        Ok(self.ctx.identity()?.roles_for_page(self.settings.id))
    }

    pub fn add_role(&mut self, role: &str) -> WireResult<()> {
        let role = self.resolve_role(role)?;
        self.ctx.identity()?.add_role_to_page(&role, self.settings.id);
        Ok(())
    }

    pub fn has_role(&self, role: &str) -> WireResult<bool> {
        let role = self.resolve_role(role)?;
        Ok(self.roles()?.iter().any(|r| r.id == role.id))
    }

    pub fn remove_role(&mut self, role: &str) -> WireResult<()> {
        let role = self.resolve_role(role)?;
        self.ctx.identity()?.remove_role_from_page(&role, self.settings.id)
    }

    fn resolve_role(&self, role: &str) -> WireResult<Rc<Role>> {
        let identity = self.ctx.identity()?;
        let resolved = match role.parse::<u32>() {
            Ok(id) => identity.role_by_id(id),
            Err(_) => identity.role_by_name(role),
        };
        resolved.ok_or_else(|| WireError::Validation(format!("Unknown role '{}'", role)))
    }

    // --- notices ---

    pub fn message(&self, text: impl Into<String>) {
        self.ctx.notices.borrow_mut().message("Page", text);
    }

    pub fn error(&self, text: impl Into<String>) {
        self.ctx.notices.borrow_mut().error("Page", text);
    }

    // --- store support ---

    pub(crate) fn ctx(&self) -> &Rc<WireContext> {
        &self.ctx
    }

    /// Drop field data orphaned by a template change; called by the page
    /// store once it has observed the previous template.
    pub(crate) fn prune_fields_for_template_change(&mut self) {
        if let (Some(previous), Some(current)) = (self.template_previous.take(), self.template.clone()) {
            for field in previous.fieldgroup.iter() {
                if !current.fieldgroup.has(&field.name) {
                    self.data.remove(&field.name);
                }
            }
        }
    }

    /// Wake the buffered compound sub-field fragments. A queue entry with
    /// `data` as its only sub-key collapses to the plain value; entries
    /// whose base is not a field of the template are dropped.
    pub(crate) fn process_field_data_queue(&mut self) -> WireResult<()> {
        let queue = std::mem::take(&mut self.field_data_queue);
        let template = match &self.template {
            Some(t) => t.clone(),
            None => return Ok(()),
        };
        for (key, mut subs) in queue {
            if template.fieldgroup.get_field(&key).is_none() {
                continue;
            }
            let value = if subs.len() == 1 && subs.contains_key("data") {
                subs.remove("data").unwrap_or(Value::Null)
            } else {
                Value::Object(subs.into_iter().collect())
            };
            self.set_field_value(&key, value, false)?;
        }
        Ok(())
    }

    pub(crate) fn clear_parent_previous(&mut self) {
        self.parent_previous = None;
    }

    pub(crate) fn set_num_children_raw(&mut self, count: u32) {
        self.settings.num_children = count;
    }

    pub(crate) fn set_created_raw(&mut self, ts: i64) {
        self.settings.created = ts;
    }

    pub(crate) fn set_modified_raw(&mut self, ts: i64) {
        self.settings.modified = ts;
    }

    /// Stamp the modifying user, and the creating user when not already
    /// set. Bypasses change tracking; a save is what calls this.
    pub(crate) fn stamp_users(&mut self, user: Rc<User>) {
        if self.created_user.is_none() {
            self.created_user = Some(user.clone());
        }
        self.modified_user = Some(user);
    }
}

impl Hookable for Page {
    fn hook_class(&self) -> &'static str {
        "Page"
    }

    fn hook_classes(&self) -> &'static [&'static str] {
        &["Page", "Wire"]
    }

    fn context(&self) -> &WireContext {
        &self.ctx
    }

    fn local_hooks(&self) -> &RefCell<HookBucket> {
        &self.local_hooks
    }

    fn hook_object_id(&self) -> u64 {
        self.instance_id
    }

    fn has_canonical(&self, method: &str) -> bool {
        matches!(method, "loaded" | "changed")
    }

    fn call_canonical(&mut self, method: &str, _arguments: &[Value]) -> WireResult<Value> {
        match method {
            // canonical bodies exist only for hooks to observe
            "loaded" | "changed" => Ok(Value::Null),
            _ => Err(WireError::UnknownMethod(format!(
                "Page::{} has no canonical implementation",
                method
            ))),
        }
    }

    fn concrete_methods(&self) -> &'static [&'static str] {
        &[
            "set",
            "get",
            "set_field_value",
            "get_unformatted",
            "is_changed",
            "children",
            "child",
            "siblings",
            "parents",
            "find",
            "path",
            "url",
            "http_url",
            "is_trash",
        ]
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        self.ctx.unregister_instance(self.instance_id);
    }
}

pub(crate) fn page_id_of(page: &PageRef) -> WireResult<u32> {
    page.try_borrow()
        .map(|p| p.settings.id)
        .map_err(|_| WireError::Validation("Page is mutably borrowed elsewhere".to_string()))
}

fn page_ids(pages: &[PageRef]) -> Value {
    Value::Array(
        pages
            .iter()
            .filter_map(|p| p.try_borrow().ok().map(|p| Value::from(p.settings.id)))
            .collect(),
    )
}

pub(crate) fn value_to_u32(value: &Value) -> u32 {
    match value {
        Value::Number(n) => n.as_u64().unwrap_or(0) as u32,
        Value::String(s) => s.trim().parse().unwrap_or(0),
        Value::Bool(b) => *b as u32,
        _ => 0,
    }
}

fn value_to_plain_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn value_is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
