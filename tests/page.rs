use std::cell::RefCell;
use std::rc::Rc;

use serde_json::json;

use wirecore::fieldtype::{
    DatetimeFieldtype, IntegerFieldtype, TextFieldtype, TextformatterEntities,
};
use wirecore::{
    Config, Field, Fieldgroup, Fields, HookOptions, Hookable, MemoryIdentity, MemoryPages, Page,
    PageBuilder, PageRef, Template, Templates, WireContext, WireError,
};

fn context() -> Rc<WireContext> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let ctx = WireContext::new(Config::default());

    let fields = Rc::new(Fields::new());
    let title = fields.add(Field::new(
        1,
        "title",
        Rc::new(TextFieldtype::new().with_formatter(Rc::new(TextformatterEntities))),
    ));
    let body = fields.add(Field::new(2, "body", Rc::new(TextFieldtype::new())));
    let count = fields.add(Field::new(3, "count", Rc::new(IntegerFieldtype)));
    let when = fields.add(Field::new(4, "when", Rc::new(DatetimeFieldtype)));
    let resort = fields.add(Field::new(5, "resort", Rc::new(TextFieldtype::new())));

    let templates = Rc::new(Templates::new());
    templates.add(Template::new(
        1,
        "basic",
        Fieldgroup::new(vec![title, body, count, when, resort]),
    ));

    ctx.install_fields(fields);
    ctx.install_templates(templates);
    ctx.install_identity(Rc::new(MemoryIdentity::new()));
    ctx.install_pages(Rc::new(MemoryPages::new()));
    ctx
}

fn basic_template(ctx: &Rc<WireContext>) -> Rc<Template> {
    ctx.templates().unwrap().get("basic").unwrap()
}

/// Load a stored page through the builder and put it in the store.
fn seed_page(ctx: &Rc<WireContext>, id: u32, name: &str, parent_id: u32, sort: u32) -> PageRef {
    let mut builder = PageBuilder::new(ctx)
        .template(basic_template(ctx))
        .set("id", json!(id))
        .unwrap()
        .set("name", json!(name))
        .unwrap()
        .set("sort", json!(sort))
        .unwrap();
    if parent_id > 0 {
        builder = builder.set("parent", json!(parent_id)).unwrap();
    }
    let page = builder.finish().unwrap();
    ctx.pages().unwrap().save(&page).unwrap();
    page
}

#[test]
fn setting_a_field_without_a_template_is_a_schema_error() {
    let ctx = context();
    let mut page = Page::new(&ctx, None);
    let err = page.set("title", json!("hello")).unwrap_err();
    assert!(matches!(err, WireError::Schema(_)));

    // fixed settings keys still work without a template
    page.set("name", json!("still fine")).unwrap();
    page.set("sort", json!(3)).unwrap();
    assert_eq!(page.name(), "still-fine");
    assert_eq!(page.sort(), 3);
}

#[test]
fn new_page_saves_and_stops_being_new() {
    let ctx = context();
    let page = Page::new_ref(&ctx, Some(basic_template(&ctx)));
    page.borrow_mut().set("name", json!("fresh")).unwrap();
    page.borrow_mut().set("title", json!("Fresh")).unwrap();
    assert!(page.borrow().is_new());
    assert!(page.borrow().is_changed(""));

    ctx.pages().unwrap().save(&page).unwrap();

    let p = page.borrow();
    assert!(!p.is_new());
    assert!(p.id() > 0);
    assert!(p.modified() > 0);
    assert!(!p.is_changed(""));
    assert_eq!(p.created_user().unwrap().name, "guest");
}

#[test]
fn save_requires_a_name() {
    let ctx = context();
    let page = Page::new_ref(&ctx, Some(basic_template(&ctx)));
    let err = ctx.pages().unwrap().save(&page).unwrap_err();
    assert!(matches!(err, WireError::Validation(_)));
}

#[test]
fn formatted_value_write_back_flags_corruption_and_blocks_save() {
    let ctx = context();
    let page = Page::new_ref(&ctx, Some(basic_template(&ctx)));
    {
        let mut p = page.borrow_mut();
        p.set("name", json!("guarded")).unwrap();
        p.set("title", json!("a < b")).unwrap();

        p.set_output_formatting(true);
        let formatted = p.get("title").unwrap();
        assert_eq!(formatted, json!("a &lt; b"));

        // writing the formatted value back is accepted, only flagged
        p.set("title", formatted).unwrap();
        assert!(p.has_status(Page::STATUS_CORRUPTED));
        p.set_output_formatting(false);
    }
    let err = ctx.pages().unwrap().save(&page).unwrap_err();
    assert!(matches!(err, WireError::Validation(_)));
}

#[test]
fn clean_writes_under_formatting_do_not_flag_corruption() {
    let ctx = context();
    let mut page = Page::new(&ctx, Some(basic_template(&ctx)));
    page.set("title", json!("plain")).unwrap();
    page.set_output_formatting(true);
    page.get("title").unwrap();
    page.set("title", json!("still plain")).unwrap();
    assert!(!page.has_status(Page::STATUS_CORRUPTED));
}

#[test]
fn builder_loads_raw_values_without_tracking_or_sanitizing() {
    let ctx = context();
    let page = PageBuilder::new(&ctx)
        .template(basic_template(&ctx))
        .set("id", json!(10))
        .unwrap()
        .set("name", json!("Kept Verbatim"))
        .unwrap()
        .set("title", json!("hello"))
        .unwrap()
        .set("count", json!("7"))
        .unwrap()
        .finish()
        .unwrap();

    let mut p = page.borrow_mut();
    assert!(p.is_loaded());
    assert!(!p.is_new());
    // raw names bypass the sanitizer during a load
    assert_eq!(p.name(), "Kept Verbatim");
    // raw values took the wakeup path
    assert_eq!(p.get("count").unwrap(), json!(7));
    // nothing during the load registered as a change
    assert!(!p.is_changed(""));

    // tracking is live again after the finalize step
    p.set("title", json!("edited")).unwrap();
    assert!(p.is_changed("title"));
    assert!(!p.is_changed("body"));
}

#[test]
fn builder_drains_fragment_queue_and_degrades_data_only_maps() {
    let ctx = context();
    let page = PageBuilder::new(&ctx)
        .template(basic_template(&ctx))
        .set("id", json!(11))
        .unwrap()
        .set("name", json!("fragments"))
        .unwrap()
        .set("when__data", json!("1970-01-02"))
        .unwrap()
        .set("ghost__data", json!("dropped"))
        .unwrap()
        .finish()
        .unwrap();

    let mut p = page.borrow_mut();
    // the data-only fragment map collapsed to the scalar and was woken
    assert_eq!(p.get("when").unwrap(), json!(86400));
    // fragments for unknown fields are dropped
    assert_eq!(p.get("ghost").unwrap(), json!(null));
}

#[test]
fn loaded_hook_fires_once_on_finish() {
    let ctx = context();
    let count = Rc::new(RefCell::new(0));
    {
        let probe = Page::new(&ctx, None);
        let c = count.clone();
        probe
            .add_hook_after(
                "loaded",
                Rc::new(move |_e| {
                    *c.borrow_mut() += 1;
                    Ok(())
                }),
                HookOptions {
                    all_instances: true,
                    ..Default::default()
                },
            )
            .unwrap();
    }
    seed_page(&ctx, 20, "observed", 0, 0);
    assert_eq!(*count.borrow(), 1);
}

#[test]
fn changed_hook_fires_only_on_actual_tracked_changes() {
    let ctx = context();
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut page = Page::new(&ctx, Some(basic_template(&ctx)));
    let l = log.clone();
    page.add_hook_after(
        "changed",
        Rc::new(move |event| {
            l.borrow_mut().push(event.arguments[0].clone());
            Ok(())
        }),
        HookOptions::default(),
    )
    .unwrap();

    page.set("title", json!("one")).unwrap();
    page.set("title", json!("one")).unwrap(); // same value, no change
    page.set("title", json!("two")).unwrap();
    assert_eq!(*log.borrow(), vec![json!("title"), json!("title")]);
}

#[test]
fn name_setting_sanitizes_and_beautifies_only_the_first_time() {
    let ctx = context();
    let mut page = Page::new(&ctx, Some(basic_template(&ctx)));
    page.set("name", json!("  Hello World!  ")).unwrap();
    assert_eq!(page.name(), "hello-world");
    page.set("name", json!("a__b")).unwrap();
    // no beautify once a name exists: separator runs survive
    assert_eq!(page.name(), "a__b");
}

#[test]
fn find_excludes_flagged_pages_by_default() {
    let ctx = context();
    let home = seed_page(&ctx, 1, "home", 0, 0);
    seed_page(&ctx, 2, "beta", 1, 2);
    seed_page(&ctx, 3, "alpha", 1, 1);
    let hidden = seed_page(&ctx, 4, "ghost", 1, 3);
    hidden
        .borrow_mut()
        .add_status(Page::STATUS_HIDDEN)
        .unwrap();
    ctx.pages().unwrap().save(&hidden).unwrap();
    home.borrow_mut().set("numChildren", json!(3)).unwrap();

    let children = home.borrow().children("").unwrap();
    let names: Vec<String> = children.iter().map(|p| p.borrow().name_or_id()).collect();
    assert_eq!(names, vec!["alpha", "beta"]);

    let all = home.borrow().children("include=all").unwrap();
    assert_eq!(all.len(), 3);

    // naming status disables the default exclusion
    let flagged = home.borrow().children("status>1000").unwrap();
    assert_eq!(flagged.len(), 1);
    assert_eq!(flagged[0].borrow().name_or_id(), "ghost");
}

#[test]
fn stored_field_values_rebuild_into_identical_gets() {
    let ctx = context();
    let page = Page::new_ref(&ctx, Some(basic_template(&ctx)));
    {
        let mut p = page.borrow_mut();
        p.set("name", json!("round-trip")).unwrap();
        p.set("title", json!("Fish & Chips")).unwrap();
        p.set("body", json!("plain text")).unwrap();
        p.set("count", json!("9")).unwrap();
        p.set("when", json!("1970-01-02 00:00:00")).unwrap();
    }
    ctx.pages().unwrap().save(&page).unwrap();

    // rebuild a second entity from the stored shape of each field
    let keys = ["title", "body", "count", "when"];
    let mut builder = PageBuilder::new(&ctx)
        .template(basic_template(&ctx))
        .set("id", json!(50))
        .unwrap()
        .set("name", json!("round-trip-copy"))
        .unwrap();
    for key in keys {
        let stored = page.borrow_mut().get_unformatted(key).unwrap();
        builder = builder.set(key, stored).unwrap();
    }
    let rebuilt = builder.finish().unwrap();

    for formatting in [false, true] {
        page.borrow_mut().set_output_formatting(formatting);
        rebuilt.borrow_mut().set_output_formatting(formatting);
        for key in keys {
            assert_eq!(
                page.borrow_mut().get(key).unwrap(),
                rebuilt.borrow_mut().get(key).unwrap(),
                "{} diverged with formatting {}",
                key,
                formatting
            );
        }
    }
}

#[test]
fn child_sort_default_applies_despite_fields_ending_in_sort() {
    let ctx = context();
    let home = seed_page(&ctx, 1, "home", 0, 0);
    home.borrow_mut().set("sortfield", json!("name")).unwrap();
    let zebra = seed_page(&ctx, 2, "zebra", 1, 1);
    let apple = seed_page(&ctx, 3, "apple", 1, 2);
    for page in [&zebra, &apple] {
        page.borrow_mut().set("resort", json!("beach")).unwrap();
        ctx.pages().unwrap().save(page).unwrap();
    }
    home.borrow_mut().set("numChildren", json!(2)).unwrap();

    // the clause text contains "sort=" but names no sort, so the
    // parent's sortfield still orders the result
    let children = home.borrow().children("resort=beach").unwrap();
    let names: Vec<String> = children.iter().map(|p| p.borrow().name_or_id()).collect();
    assert_eq!(names, vec!["apple", "zebra"]);
}

#[test]
fn paths_and_urls_walk_the_parent_chain() {
    let ctx = context();
    seed_page(&ctx, 1, "home", 0, 0);
    seed_page(&ctx, 2, "about", 1, 1);
    let contact = seed_page(&ctx, 3, "contact", 2, 1);

    let p = contact.borrow();
    assert_eq!(p.path(), "/about/contact/");
    assert_eq!(p.url(), "/about/contact/");
    assert_eq!(p.http_url(), "http://localhost/about/contact/");
    assert_eq!(p.parent_id(), 2);
    assert_eq!(
        p.root_parent().unwrap().borrow().name_or_id(),
        "about"
    );
}

#[test]
fn multikey_get_returns_the_first_non_empty_value() {
    let ctx = context();
    let mut page = Page::new(&ctx, Some(basic_template(&ctx)));
    page.set("body", json!("  ")).unwrap();
    page.set("title", json!("headline")).unwrap();
    assert_eq!(page.get("body|title").unwrap(), json!("headline"));
}

#[test]
fn selector_string_get_falls_back_to_a_matching_child() {
    let ctx = context();
    let home = seed_page(&ctx, 1, "home", 0, 0);
    seed_page(&ctx, 2, "news", 1, 1);
    home.borrow_mut().set("numChildren", json!(1)).unwrap();

    let mut p = home.borrow_mut();
    assert_eq!(p.get("name=news").unwrap(), json!(2));
    assert_eq!(p.get("name=missing").unwrap(), json!(null));
}

#[test]
fn trash_flags_and_reparents_under_the_trash_page() {
    let ctx = context();
    seed_page(&ctx, 1, "home", 0, 0);
    seed_page(&ctx, 7, "trash", 1, 99);
    let page = seed_page(&ctx, 10, "doomed", 1, 1);

    ctx.pages().unwrap().trash(&page).unwrap();
    let p = page.borrow();
    assert!(p.has_status(Page::STATUS_TRASH));
    assert!(p.is_trash());
    assert_eq!(p.parent_id(), 7);
    drop(p);

    // trashed pages disappear from default listings
    let found = ctx
        .pages()
        .unwrap()
        .find(&wirecore::selectors::Selectors::parse("name=doomed").unwrap())
        .unwrap();
    assert!(found.is_empty());
}

#[test]
fn delete_removes_from_the_store_and_flags_the_entity() {
    let ctx = context();
    seed_page(&ctx, 1, "home", 0, 0);
    let page = seed_page(&ctx, 10, "gone", 1, 1);

    ctx.pages().unwrap().delete(&page).unwrap();
    assert!(page.borrow().has_status(Page::STATUS_DELETED));
    assert!(ctx.pages().unwrap().get(10).is_none());
}

#[test]
fn locked_pages_refuse_deletion() {
    let ctx = context();
    seed_page(&ctx, 1, "home", 0, 0);
    let page = seed_page(&ctx, 10, "vault", 1, 1);
    page.borrow_mut().add_status(Page::STATUS_LOCKED).unwrap();

    let err = ctx.pages().unwrap().delete(&page).unwrap_err();
    assert!(matches!(err, WireError::Validation(_)));
}

#[test]
fn roles_round_trip_with_the_superuser_guard() {
    let ctx = context();
    let page = seed_page(&ctx, 10, "secured", 0, 0);

    let mut p = page.borrow_mut();
    p.add_role("guest").unwrap();
    assert!(p.has_role("guest").unwrap());
    p.remove_role("guest").unwrap();
    assert!(!p.has_role("guest").unwrap());

    p.add_role("superuser").unwrap();
    let err = p.remove_role("superuser").unwrap_err();
    assert!(matches!(err, WireError::Validation(_)));
}
