// Two-phase page construction.
//
// A page being restored from storage accepts raw values (which get woken
// by their field-types) and buffers compound sub-field fragments; neither
// may register as a change. The builder owns that phase: the page it
// holds reports `is_loaded() == false` until finish(), which drains the
// fragment queue, turns change tracking on with a clean slate, and fires
// the hookable loaded-notification. There is no way to flip a finished
// page back into the loading phase.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;

use crate::context::WireContext;
use crate::error::WireResult;
use crate::hooks::{HookKind, Hookable};
use crate::page::{Page, PageRef};
use crate::schema::Template;

pub struct PageBuilder {
    page: Page,
}

impl PageBuilder {
    pub fn new(ctx: &Rc<WireContext>) -> Self {
        let mut page = Page::new(ctx, None);
        page.is_new = false;
        page.is_loaded = false;
        page.tracker.set_enabled(false);
        Self { page }
    }

    pub fn template(mut self, template: Rc<Template>) -> Self {
        self.page.template = Some(template);
        self
    }

    /// Set a raw stored value. Routed through the page's set protocol, so
    /// field values take the wakeup path and names are kept verbatim.
    pub fn set(mut self, key: &str, value: Value) -> WireResult<Self> {
        self.page.set(key, value)?;
        Ok(self)
    }

    /// Complete the load: drain the fragment queue, mark the page loaded,
    /// start change tracking fresh, and notify `loaded` hooks.
    pub fn finish(mut self) -> WireResult<PageRef> {
        self.page.process_field_data_queue()?;
        self.page.is_loaded = true;
        self.page.tracker.reset(true);
        let page = Rc::new(RefCell::new(self.page));
        page.borrow_mut()
            .run_hooks("loaded", Vec::new(), HookKind::Method)?;
        Ok(page)
    }
}
