//! Concurrent requests against the same owner.

mod common;

use common::*;
use std::sync::Arc;
use std::thread;
use turbo_cart::cart::{DurableCartStore, QuantityChange};
use turbo_cart::{CartError, UserId};

const THREADS: usize = 4;
const ADDS_PER_THREAD: usize = 25;

#[test]
fn concurrent_adds_lose_no_update() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(file_engine(&dir.path().join("carts.db")));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let carrier = owner(&format!("s{t}"), "x");
                let mut applied = 0_i64;
                for _ in 0..ADDS_PER_THREAD {
                    match engine.add(&carrier, &p("7"), 1) {
                        Ok(_) => applied += 1,
                        Err(CartError::ConcurrentModification { .. }) => {}
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
                applied
            })
        })
        .collect();

    let applied: i64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert!(applied > 0);
    assert_eq!(engine.item_count(&owner("s0", "x")).unwrap(), applied);
    assert_eq!(
        engine.durable().find_open_carts(&UserId::new("x")).unwrap().len(),
        1
    );
}

#[test]
fn concurrent_first_adds_share_one_cart() {
    let engine = Arc::new(engine());

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                engine
                    .resolve_canonical_open_cart(&UserId::new("x"))
                    .map(|cart| cart.id)
                    .map_err(|e| format!("thread {t}: {e}"))
            })
        })
        .collect();

    let ids: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().unwrap().unwrap())
        .collect();
    assert!(ids.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn concurrent_mixed_updates_keep_quantities_positive() {
    let engine = Arc::new(engine());
    let x = owner("s0", "x");
    engine.add(&x, &p("7"), 50).unwrap();

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let carrier = owner(&format!("s{t}"), "x");
                for i in 0..ADDS_PER_THREAD {
                    let delta = if (i + t) % 2 == 0 { -3 } else { 2 };
                    let _ = engine.update_quantity(&carrier, &p("7"), QuantityChange::Delta(delta));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let cart = engine
        .resolve_canonical_open_cart(&UserId::new("x"))
        .unwrap();
    for line in engine.durable().lines(&cart.id).unwrap() {
        assert!(line.quantity > 0);
    }
}
