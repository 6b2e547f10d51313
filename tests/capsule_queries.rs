//! Capsule discovery against an in-memory contract.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use proptest::prelude::*;

use chrono_capsule::capsule::{
    scan_capsules, CapsuleQueryService, DashboardView, FetchOutcome, SkipReason,
};
use chrono_capsule::chain::{ChainConnection, RawCapsule};
use chrono_capsule::context::AppContext;
use chrono_capsule::wallet::StaticKeySource;

mod common;
use common::{alice, bob, carol, connected_context, test_config, MockChain};

#[tokio::test]
async fn test_lists_only_capsules_involving_the_account() {
    let chain = MockChain::new(550);
    let (a, b, c) = (alice().address(), bob().address(), carol().address());
    chain.insert_capsule(a, b, "to bob", 600);
    chain.insert_capsule(c, a, "to alice", 500);
    chain.insert_capsule(b, c, "not ours", 500);

    let ctx = connected_context(&chain, vec![alice()]).await;
    let queries = CapsuleQueryService::new();

    let outcome = queries.fetch_capsules(&ctx).await;
    assert_eq!(
        outcome,
        FetchOutcome::Completed {
            retained: 2,
            scanned: 3,
            skipped: 0
        }
    );

    let capsules = queries.capsules();
    let ids: Vec<_> = capsules.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![0, 1]);
    assert_eq!(capsules[0].message, "to bob");
    assert_eq!(capsules[1].message, "to alice");
    assert!(!capsules[0].is_unlockable(ctx.current_block()));
    assert!(capsules[1].is_unlockable(ctx.current_block()));
    assert!(!queries.is_loading());
}

#[tokio::test]
async fn test_no_capsules_issues_only_the_count_query() {
    let chain = MockChain::new(10);
    let ctx = connected_context(&chain, vec![alice()]).await;
    let queries = CapsuleQueryService::new();

    let outcome = queries.fetch_capsules(&ctx).await;
    assert_eq!(
        outcome,
        FetchOutcome::Completed {
            retained: 0,
            scanned: 0,
            skipped: 0
        }
    );
    assert!(queries.capsules().is_empty());
    assert_eq!(chain.capsule_queries(), 0);
}

#[tokio::test]
async fn test_single_index_failure_is_skipped() {
    let chain = MockChain::new(10);
    let a = alice().address();
    chain.insert_capsule(a, bob().address(), "zero", 20);
    chain.insert_capsule(a, bob().address(), "one", 20);
    chain.insert_capsule(bob().address(), a, "two", 20);
    chain.fail_index(1);

    let ctx = connected_context(&chain, vec![alice()]).await;
    let queries = CapsuleQueryService::new();

    let outcome = queries.fetch_capsules(&ctx).await;
    assert_eq!(
        outcome,
        FetchOutcome::Completed {
            retained: 2,
            scanned: 3,
            skipped: 1
        }
    );
    let ids: Vec<_> = queries.capsules().iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![0, 2]);
}

#[tokio::test]
async fn test_count_failure_keeps_previous_list() {
    let chain = MockChain::new(10);
    chain.insert_capsule(alice().address(), bob().address(), "kept", 20);

    let ctx = connected_context(&chain, vec![alice()]).await;
    let queries = CapsuleQueryService::new();
    queries.fetch_capsules(&ctx).await;
    assert_eq!(queries.capsules().len(), 1);

    chain.insert_capsule(alice().address(), bob().address(), "new", 20);
    chain.fail_total(true);

    let outcome = queries.fetch_capsules(&ctx).await;
    assert!(matches!(outcome, FetchOutcome::Aborted(_)));
    assert_eq!(queries.capsules().len(), 1);
    assert_eq!(queries.capsules()[0].message, "kept");
    assert!(!queries.is_loading());
}

#[tokio::test]
async fn test_undecodable_message_is_skipped() {
    let chain = MockChain::new(10);
    let a = alice().address();
    chain.insert(RawCapsule {
        creator: a,
        recipient: bob().address(),
        message: "0xnothex".to_string(),
        unlock_block: 20,
        value_locked: U256::ZERO,
    });
    chain.insert_capsule(a, bob().address(), "fine", 20);

    let ctx = connected_context(&chain, vec![alice()]).await;
    let queries = CapsuleQueryService::new();

    let outcome = queries.fetch_capsules(&ctx).await;
    assert_eq!(
        outcome,
        FetchOutcome::Completed {
            retained: 1,
            scanned: 2,
            skipped: 1
        }
    );
    assert_eq!(queries.capsules()[0].id, 1);
}

#[tokio::test]
async fn test_empty_slots_are_ignored() {
    let chain = MockChain::new(10);
    chain.insert_empty_slot();
    chain.insert_capsule(bob().address(), alice().address(), "after gap", 5);

    let ctx = connected_context(&chain, vec![alice()]).await;
    let queries = CapsuleQueryService::new();
    queries.fetch_capsules(&ctx).await;

    let ids: Vec<_> = queries.capsules().iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![1]);
}

#[tokio::test]
async fn test_fetch_is_idempotent() {
    let chain = MockChain::new(10);
    chain.insert_capsule(alice().address(), bob().address(), "one", 20);
    chain.insert_capsule(bob().address(), alice().address(), "two", 5);

    let ctx = connected_context(&chain, vec![alice()]).await;
    let queries = CapsuleQueryService::new();

    queries.fetch_capsules(&ctx).await;
    let first = queries.capsules();
    queries.fetch_capsules(&ctx).await;
    assert_eq!(*first, *queries.capsules());
}

#[tokio::test]
async fn test_skips_without_connection_or_account() {
    let chain = MockChain::new(10);
    chain.insert_capsule(alice().address(), bob().address(), "x", 20);

    let offline = AppContext::from_parts(
        test_config(),
        ChainConnection::disconnected(),
        Arc::new(StaticKeySource::new(vec![alice()])),
    );
    let queries = CapsuleQueryService::new();
    assert_eq!(
        queries.fetch_capsules(&offline).await,
        FetchOutcome::Skipped(SkipReason::NotConnected)
    );

    let no_account = AppContext::with_handle(
        test_config(),
        chain.handle(),
        Arc::new(StaticKeySource::new(vec![alice()])),
    );
    assert_eq!(
        queries.fetch_capsules(&no_account).await,
        FetchOutcome::Skipped(SkipReason::NoAccount)
    );
    assert!(queries.capsules().is_empty());
    assert_eq!(DashboardView::build(&no_account, &queries), DashboardView::Disconnected);
}

#[tokio::test]
async fn test_latest_fetch_wins() {
    let chain = MockChain::new(10);
    chain.insert_capsule(alice().address(), bob().address(), "a", 20);
    chain.insert_capsule(bob().address(), alice().address(), "b", 20);

    let ctx = connected_context(&chain, vec![alice(), bob()]).await;
    let queries = CapsuleQueryService::new();

    chain.set_capsule_delay(Some(Duration::from_millis(100)));
    let slow = {
        let queries = queries.clone();
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move { queries.fetch_capsules(&ctx).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(queries.is_loading());

    chain.set_capsule_delay(None);
    let fast = queries.fetch_capsules(&ctx).await;
    assert!(matches!(fast, FetchOutcome::Completed { retained: 2, .. }));

    assert_eq!(slow.await.unwrap(), FetchOutcome::Superseded);
    assert_eq!(queries.capsules().len(), 2);
    assert!(!queries.is_loading());
}

#[tokio::test]
async fn test_account_switch_discards_in_flight_result() {
    let chain = MockChain::new(10);
    chain.insert_capsule(alice().address(), carol().address(), "alice only", 20);

    let ctx = connected_context(&chain, vec![alice(), bob()]).await;
    let queries = CapsuleQueryService::new();

    chain.set_capsule_delay(Some(Duration::from_millis(100)));
    let stale = {
        let queries = queries.clone();
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move { queries.fetch_capsules(&ctx).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    ctx.accounts().select_account(bob().address()).unwrap();

    assert_eq!(stale.await.unwrap(), FetchOutcome::Superseded);
    assert!(queries.capsules().is_empty());
}

#[tokio::test]
async fn test_follow_refetches_on_account_change() {
    let chain = MockChain::new(10);
    chain.insert_capsule(alice().address(), carol().address(), "from alice", 20);
    chain.insert_capsule(carol().address(), bob().address(), "to bob", 20);

    let ctx = connected_context(&chain, vec![alice(), bob()]).await;
    let queries = CapsuleQueryService::new();
    let shutdown = chrono_capsule::Shutdown::new();

    let follower = {
        let queries = queries.clone();
        let ctx = Arc::clone(&ctx);
        let rx = shutdown.subscribe();
        tokio::spawn(async move { queries.follow(ctx, false, rx).await })
    };

    assert!(common::eventually(|| queries.owner() == Some(alice().address())).await);
    assert_eq!(queries.capsules()[0].message, "from alice");

    ctx.accounts().select_account(bob().address()).unwrap();
    assert!(common::eventually(|| queries.owner() == Some(bob().address())).await);
    assert_eq!(queries.capsules().len(), 1);
    assert_eq!(queries.capsules()[0].message, "to bob");

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(1), follower)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_dashboard_empty_text() {
    let chain = MockChain::new(10);
    chain.insert_capsule(bob().address(), carol().address(), "not ours", 20);

    let ctx = connected_context(&chain, vec![alice()]).await;
    let queries = CapsuleQueryService::new();
    queries.fetch_capsules(&ctx).await;

    let text = DashboardView::build(&ctx, &queries).to_string();
    assert!(text.contains("alice (0xf39F...2266)"));
    assert!(text.ends_with("No capsules found for your account. Create one to get started!"));
}

fn party() -> impl Strategy<Value = Address> {
    (0u8..4).prop_map(Address::repeat_byte)
}

proptest! {
    #[test]
    fn prop_scan_keeps_exactly_involved_capsules(
        pairs in proptest::collection::vec((party(), party()), 0..20),
        owner in party(),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let chain = MockChain::new(1);
        for (creator, recipient) in &pairs {
            chain.insert_capsule(*creator, *recipient, "m", 1);
        }

        let scan = runtime.block_on(scan_capsules(&*chain, owner)).unwrap();

        let expected: Vec<u64> = pairs
            .iter()
            .enumerate()
            .filter(|(_, (c, r))| *c == owner || *r == owner)
            .map(|(i, _)| i as u64)
            .collect();
        let actual: Vec<u64> = scan.capsules.iter().map(|c| c.id).collect();
        prop_assert_eq!(actual, expected);
        prop_assert_eq!(scan.total, pairs.len() as u64);
    }
}
