//! Login session state.
//!
//! A `Session` holds change-tracked variables plus the authentication
//! state for one visitor, over an injected `SessionInput` that supplies
//! cookies and client identity without any transport detail. Continuity
//! across requests is cookie + challenge based: the session id cookie
//! names the variable set, and a separate challenge cookie must match the
//! challenge stored inside it. A fingerprint of the client address and
//! user agent guards against replay from elsewhere. Both checks can be
//! disabled in config.

use std::cell::RefCell;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use chrono::Utc;
use rand::distr::Alphanumeric;
use rand::Rng;
use serde_json::Value;

use crate::context::WireContext;
use crate::error::{WireError, WireResult};
use crate::hooks::{HookBucket, HookKind, Hookable};
use crate::tracker::ChangeTracker;
use crate::users::User;

pub const SESSION_COOKIE: &str = "wires";
pub const CHALLENGE_COOKIE: &str = "wires_challenge";

const KEY_USER_ID: &str = "_user_id";
const KEY_CHALLENGE: &str = "_user_challenge";
const KEY_FINGERPRINT: &str = "_user_fingerprint";
const KEY_LAST_ACTIVE: &str = "_last_active";
const KEY_MESSAGES: &str = "_messages";
const KEY_ERRORS: &str = "_errors";

/// Client-side state of the request the session is serving.
pub trait SessionInput {
    fn cookie(&self, name: &str) -> Option<String>;
    fn set_cookie(&self, name: &str, value: &str);
    fn remove_cookie(&self, name: &str);
    fn remote_addr(&self) -> String;
    fn user_agent(&self) -> String;
}

/// In-process `SessionInput`, also the test double.
#[derive(Default)]
pub struct MemorySessionInput {
    cookies: RefCell<HashMap<String, String>>,
    pub remote_addr: String,
    pub user_agent: String,
}

impl MemorySessionInput {
    pub fn new(remote_addr: &str, user_agent: &str) -> Self {
        Self {
            cookies: RefCell::new(HashMap::new()),
            remote_addr: remote_addr.to_string(),
            user_agent: user_agent.to_string(),
        }
    }
}

impl SessionInput for MemorySessionInput {
    fn cookie(&self, name: &str) -> Option<String> {
        self.cookies.borrow().get(name).cloned()
    }

    fn set_cookie(&self, name: &str, value: &str) {
        self.cookies
            .borrow_mut()
            .insert(name.to_string(), value.to_string());
    }

    fn remove_cookie(&self, name: &str) {
        self.cookies.borrow_mut().remove(name);
    }

    fn remote_addr(&self) -> String {
        self.remote_addr.clone()
    }

    fn user_agent(&self) -> String {
        self.user_agent.clone()
    }
}

pub struct Session {
    ctx: Rc<WireContext>,
    input: Rc<dyn SessionInput>,
    session_id: String,
    data: HashMap<String, Value>,
    tracker: ChangeTracker,
    instance_id: u64,
    local_hooks: RefCell<HookBucket>,
}

fn random_token(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn fingerprint_of(input: &dyn SessionInput) -> String {
    let mut hasher = DefaultHasher::new();
    input.remote_addr().hash(&mut hasher);
    input.user_agent().hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

impl Session {
    fn new_guest(ctx: &Rc<WireContext>, input: Rc<dyn SessionInput>) -> Self {
        let mut tracker = ChangeTracker::new();
        tracker.set_enabled(true);
        let instance_id = ctx.register_instance(0);
        Self {
            ctx: ctx.clone(),
            input,
            session_id: random_token(32),
            data: HashMap::new(),
            tracker,
            instance_id,
            local_hooks: RefCell::new(HookBucket::new()),
        }
    }

    /// Begin a fresh guest session and issue its id cookie.
    pub fn start(ctx: &Rc<WireContext>, input: Rc<dyn SessionInput>) -> Self {
        let session = Self::new_guest(ctx, input);
        session.input.set_cookie(SESSION_COOKIE, &session.session_id);
        session
    }

    /// Resume from previously persisted variables. The logged-in user is
    /// restored only when the challenge cookie, the client fingerprint,
    /// and the expiry window all validate (each check individually
    /// disabled via config); any failure reverts to a clean guest
    /// session.
    pub fn resume(
        ctx: &Rc<WireContext>,
        input: Rc<dyn SessionInput>,
        data: HashMap<String, Value>,
    ) -> WireResult<Self> {
        let mut session = Self::new_guest(ctx, input);
        match session.input.cookie(SESSION_COOKIE) {
            Some(id) => session.session_id = id,
            None => session.input.set_cookie(SESSION_COOKIE, &session.session_id),
        }
        session.data = data;
        session.drain_queued_notices();

        let user_id = session
            .data
            .get(KEY_USER_ID)
            .and_then(|v| v.as_u64())
            .map(|v| v as u32);
        let user_id = match user_id {
            Some(id) => id,
            None => return Ok(session),
        };

        if !session.validate_resume() {
            tracing::debug!(user_id, "session resume rejected");
            session.reset_to_guest()?;
            return Ok(session);
        }

        let identity = ctx.identity()?;
        match identity.user_by_id(user_id) {
            Some(user) if !user.is_guest() => {
                identity.set_current_user(user);
                session.touch();
            }
            _ => session.reset_to_guest()?,
        }
        Ok(session)
    }

    fn validate_resume(&self) -> bool {
        let config = &self.ctx.config.session;
        if config.challenge {
            let stored = self.data.get(KEY_CHALLENGE).and_then(|v| v.as_str());
            let cookie = self.input.cookie(CHALLENGE_COOKIE);
            match (stored, cookie) {
                (Some(stored), Some(cookie)) if stored == cookie => {}
                _ => return false,
            }
        }
        if config.fingerprint {
            let stored = self.data.get(KEY_FINGERPRINT).and_then(|v| v.as_str());
            if stored != Some(fingerprint_of(self.input.as_ref()).as_str()) {
                return false;
            }
        }
        if config.expire_seconds > 0 {
            let last = self.data.get(KEY_LAST_ACTIVE).and_then(|v| v.as_i64());
            match last {
                Some(last) if Utc::now().timestamp() - last <= config.expire_seconds as i64 => {}
                _ => return false,
            }
        }
        true
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    // --- session variables ---

    pub fn set(&mut self, key: &str, value: Value) {
        if self.data.get(key).map_or(true, |v| v != &value) {
            self.tracker.record(key);
        }
        self.data.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Value {
        self.data.get(key).cloned().unwrap_or(Value::Null)
    }

    pub fn remove(&mut self, key: &str) {
        if self.data.remove(key).is_some() {
            self.tracker.record(key);
        }
    }

    pub fn is_changed(&self, key: &str) -> bool {
        if key.is_empty() {
            self.tracker.any()
        } else {
            self.tracker.contains(key)
        }
    }

    /// Hand the variable set off for persistence until the next resume.
    pub fn take_data(&mut self) -> HashMap<String, Value> {
        std::mem::take(&mut self.data)
    }

    // --- authentication ---

    /// Attempt a login. Returns the user on success, None on a refused or
    /// failed attempt; the reason lands in the notices.
    pub fn login(&mut self, name: &str, pass: &str) -> WireResult<Option<Rc<User>>> {
        let allowed = self.run_hooks(
            "allow_login",
            vec![Value::String(name.to_string())],
            HookKind::Method,
        )?;
        if allowed.return_value == Value::Bool(false) {
            self.error(format!("Login not attempted for '{}' (refused)", name));
            self.run_hooks(
                "login_failed",
                vec![Value::String(name.to_string())],
                HookKind::Method,
            )?;
            return Ok(None);
        }

        let identity = self.ctx.identity()?;
        let user = match identity.authenticate(name, pass) {
            Some(user) => user,
            None => {
                self.error(format!("Login failed for '{}'", name));
                self.run_hooks(
                    "login_failed",
                    vec![Value::String(name.to_string())],
                    HookKind::Method,
                )?;
                return Ok(None);
            }
        };

        identity.set_current_user(user.clone());
        self.regenerate_id();
        self.set(KEY_USER_ID, Value::from(user.id));
        if self.ctx.config.session.challenge {
            let challenge = random_token(32);
            self.input.set_cookie(CHALLENGE_COOKIE, &challenge);
            self.set(KEY_CHALLENGE, Value::String(challenge));
        }
        if self.ctx.config.session.fingerprint {
            let fp = fingerprint_of(self.input.as_ref());
            self.set(KEY_FINGERPRINT, Value::String(fp));
        }
        self.touch();
        self.message(format!("Successful login for '{}'", name));
        self.run_hooks(
            "login_success",
            vec![Value::String(name.to_string())],
            HookKind::Method,
        )?;
        Ok(Some(user))
    }

    /// End the login: clear variables and cookies, rotate the session id,
    /// revert to guest.
    pub fn logout(&mut self) -> WireResult<()> {
        let name = self.ctx.identity()?.current_user().name.clone();
        self.reset_to_guest()?;
        self.message(format!("Logged out '{}'", name));
        self.run_hooks(
            "logout_success",
            vec![Value::String(name)],
            HookKind::Method,
        )?;
        Ok(())
    }

    fn reset_to_guest(&mut self) -> WireResult<()> {
        self.data.clear();
        self.tracker.reset(true);
        self.input.remove_cookie(CHALLENGE_COOKIE);
        self.regenerate_id();
        self.ctx.identity()?.set_current_user_guest();
        Ok(())
    }

    fn regenerate_id(&mut self) {
        self.session_id = random_token(32);
        self.input.set_cookie(SESSION_COOKIE, &self.session_id);
    }

    fn touch(&mut self) {
        self.data.insert(
            KEY_LAST_ACTIVE.to_string(),
            Value::from(Utc::now().timestamp()),
        );
    }

    // --- notices ---

    /// Queue a message notice; also stored in the session so it survives
    /// a restart (e.g. across a redirect).
    pub fn message(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.ctx.notices.borrow_mut().message("Session", text.clone());
        self.queue_notice(KEY_MESSAGES, text);
    }

    pub fn error(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.ctx.notices.borrow_mut().error("Session", text.clone());
        self.queue_notice(KEY_ERRORS, text);
    }

    fn queue_notice(&mut self, key: &str, text: String) {
        let entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(items) = entry {
            items.push(Value::String(text));
        }
    }

    /// Move notices queued by a previous request into the context sink.
    fn drain_queued_notices(&mut self) {
        for (key, is_error) in [(KEY_MESSAGES, false), (KEY_ERRORS, true)] {
            if let Some(Value::Array(items)) = self.data.remove(key) {
                let mut notices = self.ctx.notices.borrow_mut();
                for item in items {
                    if let Value::String(text) = item {
                        if is_error {
                            notices.error("Session", text);
                        } else {
                            notices.message("Session", text);
                        }
                    }
                }
            }
        }
    }
}

impl Hookable for Session {
    fn hook_class(&self) -> &'static str {
        "Session"
    }

    fn hook_classes(&self) -> &'static [&'static str] {
        &["Session", "Wire"]
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
        matches!(
            method,
            "allow_login" | "login_success" | "login_failed" | "logout_success"
        )
    }

    fn call_canonical(&mut self, method: &str, _arguments: &[Value]) -> WireResult<Value> {
        match method {
            // permissive by default; hooks veto by rewriting to false
            "allow_login" => Ok(Value::Bool(true)),
            "login_success" | "login_failed" | "logout_success" => Ok(Value::Null),
            _ => Err(WireError::UnknownMethod(format!(
                "Session::{} has no canonical implementation",
                method
            ))),
        }
    }

    fn concrete_methods(&self) -> &'static [&'static str] {
        &["login", "logout", "set", "get", "remove"]
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.ctx.unregister_instance(self.instance_id);
    }
}
