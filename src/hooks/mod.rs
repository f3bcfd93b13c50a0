// Hook runtime - interception records, registry buckets, and dispatch

pub mod dispatch;
pub mod registry;

pub use dispatch::{HookRun, Hookable};
pub use registry::{
    HookBucket, HookEvent, HookFn, HookId, HookKind, HookOptions, HookRecord, HookWhen,
};
