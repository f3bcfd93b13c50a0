// Wirecore - hook-dispatch runtime and content entity layer

// Hook runtime - interception registry and dispatch seam
pub mod hooks;

// Application context - per-process collaborator and hook-cache holder
pub mod context;

// Content entities - pages, their builder, and the page store
pub mod page;
pub mod pages;

// Schema - fields, fieldgroups, templates, and field-type transforms
pub mod fieldtype;
pub mod schema;

// Collaborators
pub mod notices;
pub mod sanitize;
pub mod selectors;
pub mod session;
pub mod users;

// Common utilities
pub mod config;
pub mod error;
pub mod tracker;

// Re-exports for convenience
pub use config::Config;
pub use context::WireContext;
pub use error::{WireError, WireResult};
pub use hooks::{HookEvent, HookFn, HookId, HookKind, HookOptions, HookRun, HookWhen, Hookable};
pub use notices::{Notice, NoticeKind, Notices};
pub use page::{Page, PageBuilder, PageRef};
pub use pages::{MemoryPages, PageStore, Sortfields};
pub use schema::{Field, Fieldgroup, Fields, HttpsMode, Template, Templates};
pub use session::{MemorySessionInput, Session, SessionInput};
pub use users::{IdentityStore, MemoryIdentity, Role, User};
