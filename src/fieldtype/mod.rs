// Field-type collaborators - per-field storage/wakeup/sanitize/format transforms

mod datetime;
mod integer;
mod text;

pub use datetime::{parse_timestamp, DatetimeFieldtype};
pub use integer::IntegerFieldtype;
pub use text::{TextFieldtype, Textformatter, TextformatterEntities};

use serde_json::Value;

use crate::error::WireResult;
use crate::page::Page;
use crate::schema::Field;

/// Transform contract for one kind of field.
///
/// A field value has three representations: the raw storage form, the
/// in-memory form (after wakeup), and the display form (after format).
/// Sanitize guards every write of the in-memory form.
pub trait Fieldtype {
    fn name(&self) -> &'static str;

    /// Raw storage representation -> in-memory representation.
    fn wakeup_value(&self, page: &Page, field: &Field, raw: Value) -> Value;

    /// Ensure a value about to be stored on the page is in a safe form.
    fn sanitize_value(&self, page: &Page, field: &Field, value: Value) -> Value;

    /// In-memory representation -> display representation. Must be a pure
    /// projection; the page compares it against the raw value to detect
    /// accidental write-back of formatted output.
    fn format_value(&self, page: &Page, field: &Field, value: &Value) -> Value;

    /// The sentinel stored when null is assigned to a field of this type.
    fn blank_value(&self, page: &Page, field: &Field) -> Value;

    /// Value for a field that has never been stored.
    fn default_value(&self, page: &Page, field: &Field) -> Value {
        self.blank_value(page, field)
    }

    /// Pull the raw value for this page/field from the storage backend,
    /// or None when nothing is stored.
    fn load_page_field(&self, _page: &Page, _field: &Field) -> WireResult<Option<Value>> {
        Ok(None)
    }
}
