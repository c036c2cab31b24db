//! PostgreSQL store integration tests.
//!
//! Run against a live database: `DATABASE_URL=postgres://... cargo test
//! --features postgres`. Each test skips itself when no Postgres URL is set.
//! Tests use fresh ids, so a shared database is fine.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use gifting_types::{
    Credits, Currency, DomainError, ItemKind, ItemStatus, LedgerStore, Money, OwnerId, RepoError,
    SettledItem, TargetId, Transaction,
    domain::{REASON_CREDIT_PURCHASE, REASON_ITEM_PURCHASE},
};

use crate::postgres::PgStore;

async fn setup_store() -> Option<PgStore> {
    let url = std::env::var("DATABASE_URL")
        .ok()
        .filter(|url| url.starts_with("postgres"))?;
    Some(PgStore::new(&url).await.unwrap())
}

fn credits(v: i64) -> Credits {
    Credits::new(v).unwrap()
}

fn usd(amount: i64) -> Money {
    Money::new(amount, Currency::USD).unwrap()
}

async fn fund(store: &PgStore, owner: OwnerId, balance: i64) {
    let now = Utc::now();
    let mut unit = store.begin().await.unwrap();
    unit.open_ledger_for_update(owner, now).await.unwrap();
    unit.credit(owner, credits(balance), now).await.unwrap();
    unit.append(&Transaction::credit(
        owner,
        credits(balance),
        usd(balance * 20),
        REASON_CREDIT_PURCHASE,
        None,
        now,
    ))
    .await
    .unwrap();
    unit.commit().await.unwrap();
}

fn donation(buyer: OwnerId) -> SettledItem {
    SettledItem::pending(
        buyer,
        TargetId::new(),
        ItemKind::Donation { amount: usd(3500) },
        Utc::now(),
    )
}

#[tokio::test]
async fn test_pg_commit_and_rollback() {
    let Some(store) = setup_store().await else {
        return;
    };
    let owner = OwnerId::new();
    fund(&store, owner, 150).await;

    {
        let mut unit = store.begin().await.unwrap();
        unit.ledger_for_update(owner).await.unwrap();
        unit.debit(owner, credits(100), Utc::now()).await.unwrap();
        unit.insert_item(&donation(owner)).await.unwrap();
        // dropped without commit
    }

    let ledger = store.get_ledger(owner).await.unwrap().unwrap();
    assert_eq!(ledger.balance, credits(150));
    let txs = store.list_transactions(owner).await.unwrap();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].amount_credits, 150);
}

#[tokio::test]
async fn test_pg_insufficient_debit_changes_nothing() {
    let Some(store) = setup_store().await else {
        return;
    };
    let owner = OwnerId::new();
    fund(&store, owner, 50).await;

    let mut unit = store.begin().await.unwrap();
    unit.ledger_for_update(owner).await.unwrap();
    let result = unit.debit(owner, credits(100), Utc::now()).await;
    assert!(matches!(
        result,
        Err(RepoError::Domain(DomainError::InsufficientBalance {
            required: 100,
            available: 50
        }))
    ));
    unit.commit().await.unwrap();

    let ledger = store.get_ledger(owner).await.unwrap().unwrap();
    assert_eq!(ledger.balance, credits(50));
}

#[tokio::test]
async fn test_pg_concurrent_spenders_one_wins() {
    let Some(store) = setup_store().await else {
        return;
    };
    let store = Arc::new(store);
    let owner = OwnerId::new();
    fund(&store, owner, 100).await;

    // Each unit holds its own pooled connection; the row lock serializes them.
    let mut handles = Vec::new();
    for _ in 0..2 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let mut unit = store.begin().await?;
            unit.ledger_for_update(owner).await?;
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            unit.debit(owner, credits(100), Utc::now()).await?;
            unit.append(&Transaction::debit(
                owner,
                credits(100),
                usd(2000),
                REASON_ITEM_PURCHASE,
                None,
                Utc::now(),
            ))
            .await?;
            unit.commit().await
        }));
    }

    let mut ok = 0;
    let mut insufficient = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => ok += 1,
            Err(RepoError::Domain(DomainError::InsufficientBalance { .. })) => insufficient += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!((ok, insufficient), (1, 1));

    let ledger = store.get_ledger(owner).await.unwrap().unwrap();
    assert!(ledger.balance.is_zero());
    let sum: i64 = store
        .list_transactions(owner)
        .await
        .unwrap()
        .iter()
        .map(|tx| tx.amount_credits)
        .sum();
    assert_eq!(sum, ledger.balance.value());
}

#[tokio::test]
async fn test_pg_paid_item_cannot_be_overwritten() {
    let Some(store) = setup_store().await else {
        return;
    };
    let mut item = donation(OwnerId::new());

    let mut unit = store.begin().await.unwrap();
    unit.insert_item(&item).await.unwrap();
    item.mark_paid(Some("pi_1".into()), Utc::now());
    unit.update_item(&item).await.unwrap();
    unit.commit().await.unwrap();

    let mut unit = store.begin().await.unwrap();
    let mut stored = unit.item_for_update(item.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ItemStatus::Paid);
    stored.status = ItemStatus::Failed;
    assert!(matches!(
        unit.update_item(&stored).await,
        Err(RepoError::Domain(DomainError::AlreadySettled(_)))
    ));
    drop(unit);

    let reread = store.get_item(item.id).await.unwrap().unwrap();
    assert_eq!(reread.status, ItemStatus::Paid);
}

#[tokio::test]
async fn test_pg_duplicate_session_id_conflicts() {
    let Some(store) = setup_store().await else {
        return;
    };
    let session = format!("cs_{}", Uuid::new_v4());
    let buyer = OwnerId::new();
    let mut first = donation(buyer);
    let mut second = donation(buyer);

    let mut unit = store.begin().await.unwrap();
    unit.insert_item(&first).await.unwrap();
    unit.insert_item(&second).await.unwrap();
    first.attach_session(session.clone()).unwrap();
    unit.update_item(&first).await.unwrap();
    unit.commit().await.unwrap();

    let mut unit = store.begin().await.unwrap();
    second.attach_session(session.clone()).unwrap();
    assert!(matches!(
        unit.update_item(&second).await,
        Err(RepoError::Conflict(_))
    ));
    drop(unit);

    let mut unit = store.begin().await.unwrap();
    let found = unit.item_for_update_by_session(&session).await.unwrap();
    assert_eq!(found.map(|i| i.id), Some(first.id));
}
