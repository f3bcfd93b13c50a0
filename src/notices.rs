//! Accumulated user-facing notices.
//!
//! User-facing failures are line-item messages collected here and
//! rendered by an outer layer, never exceptions.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Message,
    Error,
}

#[derive(Debug, Clone)]
pub struct Notice {
    pub kind: NoticeKind,
    /// Name of the type that reported the notice.
    pub class: String,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct Notices {
    items: Vec<Notice>,
}

impl Notices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, notice: Notice) {
        match notice.kind {
            NoticeKind::Message => tracing::info!(class = %notice.class, "{}", notice.text),
            NoticeKind::Error => tracing::warn!(class = %notice.class, "{}", notice.text),
        }
        self.items.push(notice);
    }

    pub fn message(&mut self, class: &str, text: impl Into<String>) {
        self.add(Notice {
            kind: NoticeKind::Message,
            class: class.to_string(),
            text: text.into(),
        });
    }

    pub fn error(&mut self, class: &str, text: impl Into<String>) {
        self.add(Notice {
            kind: NoticeKind::Error,
            class: class.to_string(),
            text: text.into(),
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notice> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drain all notices, e.g. for rendering or for re-queueing across a redirect.
    pub fn take(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.items)
    }
}
