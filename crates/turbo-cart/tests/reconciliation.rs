//! End-to-end behavior of the reconciliation engine.

mod common;

use common::*;
use turbo_cart::cart::{
    DurableCartStore, LoginTransition, OpenCarts, QuantityChange, UpdateOutcome, REMOVE_DELTA,
};
use turbo_cart::{CartError, Currency, Money, UserId};

#[test]
fn guest_cart_merges_into_owner_without_cart() {
    let engine = engine();
    let visit = guest("s1");
    engine.add(&visit, &p("7"), 2).unwrap();

    let login = LoginTransition::new(&engine).on_login_success(visit, UserId::new("x"));
    let report = login.merge.unwrap();
    assert_eq!(report.merged, 1);

    let view = engine.current_view(&login.carrier).unwrap();
    assert_eq!(durable_lines(&engine, "x"), vec![("7".to_string(), 2)]);
    assert_eq!(view.total_items, 2);
    assert_eq!(view.total_amount, Money::new(2500, Currency::USD));
    assert_eq!(engine.item_count(&guest("s1")).unwrap(), 0);
}

#[test]
fn add_then_large_negative_delta_removes_line() {
    let engine = engine();
    let x = owner("s1", "x");
    engine.add(&x, &p("7"), 3).unwrap();

    assert_eq!(engine.add(&x, &p("7"), 2).unwrap().quantity, 5);
    assert_eq!(
        engine
            .update_quantity(&x, &p("7"), QuantityChange::Delta(-10))
            .unwrap(),
        UpdateOutcome::Removed
    );
    assert_eq!(engine.item_count(&x).unwrap(), 0);
    assert!(engine.current_view(&x).unwrap().is_empty());
}

#[test]
fn duplicate_open_carts_fold_into_most_recent() {
    let engine = legacy_engine();
    let store = engine.durable();
    let x = UserId::new("x");

    let a = store.create_cart(&x).unwrap();
    store.insert_line(&a.id, &p("1"), 2).unwrap();
    let b = store.create_cart(&x).unwrap();
    store.insert_line(&b.id, &p("1"), 1).unwrap();
    store.insert_line(&b.id, &p("2"), 4).unwrap();

    let keeper = engine.resolve_canonical_open_cart(&x).unwrap();
    assert_eq!(keeper.id, b.id);
    assert!(matches!(store.find_open_carts(&x).unwrap(), OpenCarts::Single(_)));
    assert_eq!(
        durable_lines(&engine, "x"),
        vec![("1".to_string(), 3), ("2".to_string(), 4)]
    );
}

#[test]
fn reads_heal_duplicates_too() {
    let engine = legacy_engine();
    let store = engine.durable();
    let x = UserId::new("x");
    for quantity in 1..=3 {
        let cart = store.create_cart(&x).unwrap();
        store.insert_line(&cart.id, &p("7"), quantity).unwrap();
    }

    assert_eq!(engine.item_count(&owner("s1", "x")).unwrap(), 6);
    assert_eq!(store.find_open_carts(&x).unwrap().len(), 1);
}

#[test]
fn merging_empty_guest_cart_never_creates_durable_cart() {
    let engine = engine();
    let x = owner("s1", "x");

    // no session at all
    assert!(engine.merge_anonymous_into_durable(&x).unwrap().is_noop());

    // a session whose cart was emptied
    engine.add(&guest("s1"), &p("7"), 1).unwrap();
    engine
        .update_quantity(&guest("s1"), &p("7"), QuantityChange::Remove)
        .unwrap();
    assert!(engine.merge_anonymous_into_durable(&x).unwrap().is_noop());

    assert!(engine
        .durable()
        .find_open_carts(&UserId::new("x"))
        .unwrap()
        .is_empty());
}

#[test]
fn merge_conserves_quantities() {
    let engine = engine();
    let x = owner("s1", "x");
    engine.add(&x, &p("7"), 3).unwrap();
    engine.add(&x, &p("1"), 1).unwrap();

    engine.add(&guest("s1"), &p("7"), 2).unwrap();
    engine.add(&guest("s1"), &p("2"), 5).unwrap();

    let report = engine.merge_anonymous_into_durable(&x).unwrap();
    assert_eq!(report.merged, 2);
    assert_eq!(
        durable_lines(&engine, "x"),
        vec![("1".to_string(), 1), ("2".to_string(), 5), ("7".to_string(), 5)]
    );
}

#[test]
fn merge_happens_once() {
    let engine = engine();
    let x = owner("s1", "x");
    engine.add(&guest("s1"), &p("7"), 2).unwrap();

    engine.merge_anonymous_into_durable(&x).unwrap();
    let second = engine.merge_anonymous_into_durable(&x).unwrap();
    assert!(second.is_noop());
    assert_eq!(engine.item_count(&x).unwrap(), 2);
}

#[test]
fn merge_skips_products_gone_from_catalog() {
    let engine = engine();
    let x = owner("s1", "x");
    engine.add(&guest("s1"), &p("7"), 2).unwrap();
    engine.add(&guest("s1"), &p("discontinued"), 4).unwrap();

    let report = engine.merge_anonymous_into_durable(&x).unwrap();
    assert_eq!(report.merged, 1);
    assert_eq!(report.skipped, vec![p("discontinued")]);
    assert_eq!(durable_lines(&engine, "x"), vec![("7".to_string(), 2)]);
    assert_eq!(engine.item_count(&guest("s1")).unwrap(), 0);
}

#[test]
fn remove_is_idempotent() {
    let engine = engine();
    for carrier in [guest("s1"), owner("s2", "x")] {
        engine.add(&carrier, &p("7"), 2).unwrap();
        let first = engine
            .update_quantity(&carrier, &p("7"), QuantityChange::from(REMOVE_DELTA))
            .unwrap();
        let second = engine
            .update_quantity(&carrier, &p("7"), QuantityChange::Remove)
            .unwrap();
        assert_eq!(first, UpdateOutcome::Removed);
        assert_eq!(second, UpdateOutcome::Missing);
        assert_eq!(engine.item_count(&carrier).unwrap(), 0);
    }
}

#[test]
fn stale_line_update_is_a_noop() {
    let engine = engine();
    let x = owner("s1", "x");
    engine.add(&x, &p("7"), 1).unwrap();

    let outcome = engine
        .update_quantity(&x, &p("8"), QuantityChange::Delta(3))
        .unwrap();
    assert_eq!(outcome, UpdateOutcome::Missing);
    assert_eq!(durable_lines(&engine, "x"), vec![("7".to_string(), 1)]);
}

#[test]
fn view_drops_lines_for_deleted_products() {
    let engine = engine();
    let x = owner("s1", "x");
    engine.add(&x, &p("7"), 1).unwrap();
    engine.add(&x, &p("8"), 2).unwrap();

    engine.catalog().remove(&p("8"));
    let view = engine.current_view(&x).unwrap();
    assert_eq!(view.lines.len(), 1);
    assert_eq!(view.total_items, 1);
    // the stored line still counts toward the badge
    assert_eq!(engine.item_count(&x).unwrap(), 3);
}

#[test]
fn durable_add_of_unknown_product_is_rejected() {
    let engine = engine();
    let err = engine.add(&owner("s1", "x"), &p("404"), 1).unwrap_err();
    assert!(matches!(err, CartError::ProductNotFound(ref id) if id.as_str() == "404"));
}

#[test]
fn checkout_snapshot_uses_catalog_prices() {
    let engine = engine();
    let x = owner("s1", "x");
    engine.add(&x, &p("7"), 2).unwrap();

    let items = engine.current_view(&x).unwrap().checkout_items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "Teapot");
    assert_eq!(items[0].quantity, 2);
    assert_eq!(items[0].unit_amount_minor, 1250);
}

#[test]
fn normalize_all_heals_and_installs_index() {
    let db = turbo_db::Db::open_in_memory().unwrap();
    let engine = engine_with(
        db,
        turbo_cart::StoreConfig {
            enforce_single_open_cart: false,
        },
    );
    let store = engine.durable();
    for user in ["x", "y"] {
        let owner = UserId::new(user);
        store.create_cart(&owner).unwrap();
        store.create_cart(&owner).unwrap();
    }

    let report = engine.normalize_all().unwrap();
    assert_eq!(report.folds.len(), 2);
    // this store was opened with enforcement off
    assert!(!report.index_installed);
    assert!(store.owners_with_duplicate_open_carts().unwrap().is_empty());
}

#[test]
fn carts_persist_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("carts.db");

    {
        let engine = file_engine(&path);
        engine.add(&owner("s1", "x"), &p("7"), 4).unwrap();
    }

    let engine = file_engine(&path);
    assert_eq!(engine.item_count(&owner("s2", "x")).unwrap(), 4);
}

#[test]
fn price_changes_show_in_next_view() {
    let engine = engine();
    let visit = guest("s1");
    let x = owner("s2", "x");
    engine.add(&visit, &p("7"), 2).unwrap();
    engine.add(&x, &p("7"), 3).unwrap();
    assert_eq!(
        engine.current_view(&visit).unwrap().total_amount,
        Money::new(2500, Currency::USD)
    );
    assert_eq!(
        engine.current_view(&x).unwrap().total_amount,
        Money::new(3750, Currency::USD)
    );

    engine
        .catalog()
        .insert("7", "Cast Iron Teapot", Money::new(2000, Currency::USD));

    let guest_view = engine.current_view(&visit).unwrap();
    assert_eq!(guest_view.total_amount, Money::new(4000, Currency::USD));
    assert_eq!(guest_view.lines[0].product_name, "Cast Iron Teapot");

    let owner_view = engine.current_view(&x).unwrap();
    assert_eq!(owner_view.total_amount, Money::new(6000, Currency::USD));
    assert_eq!(owner_view.lines[0].unit_price, Money::new(2000, Currency::USD));
}

#[test]
fn foreign_currency_line_does_not_break_view() {
    let engine = engine();
    let x = owner("s1", "x");
    engine.add(&x, &p("7"), 1).unwrap();
    engine.add(&x, &p("8"), 1).unwrap();

    engine
        .catalog()
        .insert("8", "Saucer", Money::new(400, Currency::EUR));

    assert_eq!(engine.item_count(&x).unwrap(), 2);
    let view = engine.current_view(&x).unwrap();
    assert_eq!(view.lines.len(), 1);
    assert_eq!(view.total_items, 1);
    assert_eq!(view.total_amount, Money::new(1250, Currency::USD));
    assert_eq!(view.checkout_items().len(), 1);
}
