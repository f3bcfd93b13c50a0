use std::rc::Rc;

use serde_json::json;

use wirecore::session::CHALLENGE_COOKIE;
use wirecore::users::User;
use wirecore::{
    Config, HookOptions, Hookable, MemoryIdentity, MemorySessionInput, NoticeKind, Session,
    SessionInput, WireContext,
};

fn context_with_user(name: &str, pass: &str) -> Rc<WireContext> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let ctx = WireContext::new(Config::default());
    let identity = Rc::new(MemoryIdentity::new());
    identity.add_user(User::new(100, name, pass, vec![1]));
    ctx.install_identity(identity);
    ctx
}

#[test]
fn login_logout_round_trip() {
    let ctx = context_with_user("ryan", "secret");
    let input = Rc::new(MemorySessionInput::new("10.0.0.1", "test-agent"));

    let mut session = Session::start(&ctx, input.clone());
    let before_login = session.session_id().to_string();

    let user = session.login("ryan", "secret").unwrap().unwrap();
    assert_eq!(user.name, "ryan");
    assert_eq!(ctx.identity().unwrap().current_user().name, "ryan");
    // the session id rotates on login
    assert_ne!(session.session_id(), before_login);
    assert!(input.cookie(CHALLENGE_COOKIE).is_some());

    session.logout().unwrap();
    assert!(ctx.identity().unwrap().current_user().is_guest());
    assert!(input.cookie(CHALLENGE_COOKIE).is_none());
}

#[test]
fn resume_restores_the_user_when_challenge_and_fingerprint_validate() {
    let ctx = context_with_user("ryan", "secret");
    let input = Rc::new(MemorySessionInput::new("10.0.0.1", "test-agent"));

    let mut session = Session::start(&ctx, input.clone());
    session.login("ryan", "secret").unwrap().unwrap();
    let data = session.take_data();
    drop(session);

    // same client, same cookies
    let _resumed = Session::resume(&ctx, input, data).unwrap();
    assert_eq!(ctx.identity().unwrap().current_user().name, "ryan");
}

#[test]
fn resume_with_a_wrong_challenge_reverts_to_guest() {
    let ctx = context_with_user("ryan", "secret");
    let input = Rc::new(MemorySessionInput::new("10.0.0.1", "test-agent"));

    let mut session = Session::start(&ctx, input.clone());
    session.login("ryan", "secret").unwrap().unwrap();
    let data = session.take_data();
    drop(session);

    input.set_cookie(CHALLENGE_COOKIE, "forged");
    let _resumed = Session::resume(&ctx, input, data).unwrap();
    assert!(ctx.identity().unwrap().current_user().is_guest());
}

#[test]
fn resume_from_a_different_client_reverts_to_guest() {
    let ctx = context_with_user("ryan", "secret");
    let input = Rc::new(MemorySessionInput::new("10.0.0.1", "test-agent"));

    let mut session = Session::start(&ctx, input.clone());
    session.login("ryan", "secret").unwrap().unwrap();
    let data = session.take_data();
    drop(session);

    // carry the cookies over but change the client fingerprint
    let other = Rc::new(MemorySessionInput::new("10.9.9.9", "other-agent"));
    other.set_cookie(CHALLENGE_COOKIE, &input.cookie(CHALLENGE_COOKIE).unwrap());
    let _resumed = Session::resume(&ctx, other, data).unwrap();
    assert!(ctx.identity().unwrap().current_user().is_guest());
}

#[test]
fn allow_login_hook_vetoes_valid_credentials() {
    let ctx = context_with_user("ryan", "secret");
    let input = Rc::new(MemorySessionInput::new("10.0.0.1", "test-agent"));
    let mut session = Session::start(&ctx, input);

    session
        .add_hook_after(
            "allow_login",
            Rc::new(|event| {
                event.return_value = json!(false);
                Ok(())
            }),
            HookOptions::default(),
        )
        .unwrap();

    assert!(session.login("ryan", "secret").unwrap().is_none());
    assert!(ctx.identity().unwrap().current_user().is_guest());
}

#[test]
fn failed_login_leaves_an_error_notice() {
    let ctx = context_with_user("ryan", "secret");
    let input = Rc::new(MemorySessionInput::new("10.0.0.1", "test-agent"));
    let mut session = Session::start(&ctx, input);

    assert!(session.login("ryan", "wrong").unwrap().is_none());
    let notices = ctx.notices.borrow();
    assert!(notices
        .iter()
        .any(|n| n.kind == NoticeKind::Error && n.text.contains("ryan")));
}

#[test]
fn session_variables_are_change_tracked() {
    let ctx = context_with_user("ryan", "secret");
    let input = Rc::new(MemorySessionInput::new("10.0.0.1", "test-agent"));
    let mut session = Session::start(&ctx, input);

    session.set("cart", json!(["book"]));
    assert_eq!(session.get("cart"), json!(["book"]));
    assert!(session.is_changed("cart"));
    session.set("cart", json!(["book"]));
    assert!(session.is_changed(""));
}

#[test]
fn queued_notices_survive_a_restart() {
    let ctx = context_with_user("ryan", "secret");
    let input = Rc::new(MemorySessionInput::new("10.0.0.1", "test-agent"));

    let mut session = Session::start(&ctx, input.clone());
    session.message("see you after the redirect");
    let data = session.take_data();
    drop(session);

    let fresh_ctx = context_with_user("ryan", "secret");
    let _resumed = Session::resume(&fresh_ctx, input, data).unwrap();
    let notices = fresh_ctx.notices.borrow();
    assert!(notices
        .iter()
        .any(|n| n.kind == NoticeKind::Message
            && n.text.contains("see you after the redirect")));
}
