// Schema objects - fields, fieldgroups, templates, and their registries

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::fieldtype::Fieldtype;

/// One dynamic field definition: a name bound to a field-type.
pub struct Field {
    pub id: u32,
    pub name: String,
    pub label: String,
    pub fieldtype: Rc<dyn Fieldtype>,
}

impl Field {
    pub fn new(id: u32, name: &str, fieldtype: Rc<dyn Fieldtype>) -> Self {
        Self {
            id,
            name: name.to_string(),
            label: name.to_string(),
            fieldtype,
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("fieldtype", &self.fieldtype.name())
            .finish()
    }
}

/// Ordered set of fields a template grants to its pages.
#[derive(Debug, Default, Clone)]
pub struct Fieldgroup {
    fields: Vec<Rc<Field>>,
}

impl Fieldgroup {
    pub fn new(fields: Vec<Rc<Field>>) -> Self {
        Self { fields }
    }

    pub fn get_field(&self, name: &str) -> Option<Rc<Field>> {
        self.fields.iter().find(|f| f.name == name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<Field>> {
        self.fields.iter()
    }
}

/// Protocol choice for a page URL rendered from this template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpsMode {
    /// Follow the global config.
    #[default]
    Inherit,
    Force,
    Never,
}

/// The schema object: defines which dynamic fields a page may hold.
#[derive(Debug, Clone)]
pub struct Template {
    pub id: u32,
    pub name: String,
    pub https: HttpsMode,
    pub fieldgroup: Fieldgroup,
}

impl Template {
    pub fn new(id: u32, name: &str, fieldgroup: Fieldgroup) -> Self {
        Self {
            id,
            name: name.to_string(),
            https: HttpsMode::Inherit,
            fieldgroup,
        }
    }

    pub fn with_https(mut self, https: HttpsMode) -> Self {
        self.https = https;
        self
    }
}

/// Registry of all templates known to the context.
#[derive(Debug, Default)]
pub struct Templates {
    items: RefCell<Vec<Rc<Template>>>,
}

impl Templates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, template: Template) -> Rc<Template> {
        let template = Rc::new(template);
        self.items.borrow_mut().push(template.clone());
        template
    }

    pub fn get(&self, name: &str) -> Option<Rc<Template>> {
        self.items.borrow().iter().find(|t| t.name == name).cloned()
    }

    pub fn get_by_id(&self, id: u32) -> Option<Rc<Template>> {
        self.items.borrow().iter().find(|t| t.id == id).cloned()
    }
}

/// Registry of all field definitions known to the context.
#[derive(Debug, Default)]
pub struct Fields {
    items: RefCell<Vec<Rc<Field>>>,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, field: Field) -> Rc<Field> {
        let field = Rc::new(field);
        self.items.borrow_mut().push(field.clone());
        field
    }

    pub fn get(&self, name: &str) -> Option<Rc<Field>> {
        self.items.borrow().iter().find(|f| f.name == name).cloned()
    }

    pub fn get_by_id(&self, id: u32) -> Option<Rc<Field>> {
        self.items.borrow().iter().find(|f| f.id == id).cloned()
    }
}
