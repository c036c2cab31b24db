//! GiftingService unit tests.

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;

    use gifting_repo::memory::MemoryStore;
    use gifting_repo::security::signature_header;
    use gifting_types::{
        AppError, BundleId, CatalogEntry, CatalogEntryId, CheckoutSession, CheckoutSessionRequest,
        Clock, CreditBundle, Credits, Currency, EventOutcome, GatewayError, ItemId, ItemStatus,
        LedgerStore, Money, Notification, NotificationDispatch, NotifyError, OwnerId,
        PaymentGateway, Purpose, TargetId, Transaction, TransactionType,
        domain::{REASON_CREDIT_PURCHASE, REASON_ITEM_PURCHASE},
    };

    use crate::{GiftingService, ServiceConfig};

    const SECRET: &str = "whsec_test";

    // ─────────────────────────────────────────────────────────────────────────
    // Fakes
    // ─────────────────────────────────────────────────────────────────────────

    pub struct FixedClock(pub DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    #[derive(Clone, Copy)]
    pub enum GatewayBehavior {
        Succeed,
        Fail,
        Hang,
    }

    /// Gateway that hands out `cs_1`, `cs_2`, ... and remembers every request.
    pub struct FakeGateway {
        behavior: GatewayBehavior,
        opened: AtomicUsize,
        requests: Mutex<Vec<CheckoutSessionRequest>>,
    }

    impl FakeGateway {
        pub fn new(behavior: GatewayBehavior) -> Self {
            Self {
                behavior,
                opened: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn last_request(&self) -> CheckoutSessionRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl PaymentGateway for FakeGateway {
        async fn create_checkout_session(
            &self,
            req: CheckoutSessionRequest,
        ) -> Result<CheckoutSession, GatewayError> {
            self.requests.lock().unwrap().push(req);
            match self.behavior {
                GatewayBehavior::Fail => {
                    return Err(GatewayError::Unreachable("connection refused".into()));
                }
                GatewayBehavior::Hang => tokio::time::sleep(Duration::from_secs(30)).await,
                GatewayBehavior::Succeed => {}
            }
            let n = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(CheckoutSession {
                session_id: format!("cs_{}", n),
                checkout_url: format!("https://pay.test/cs_{}", n),
            })
        }
    }

    #[derive(Default)]
    pub struct RecordingNotifier {
        sent: Mutex<Vec<Notification>>,
        fail: bool,
    }

    impl RecordingNotifier {
        pub fn sent(&self) -> Vec<Notification> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationDispatch for RecordingNotifier {
        async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
            if self.fail {
                return Err(NotifyError::QueueFull);
            }
            self.sent.lock().unwrap().push(notification);
            Ok(())
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Harness
    // ─────────────────────────────────────────────────────────────────────────

    struct Harness {
        service: GiftingService<MemoryStore>,
        store: MemoryStore,
        gateway: Arc<FakeGateway>,
        notifier: Arc<RecordingNotifier>,
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn build(behavior: GatewayBehavior, notifier: RecordingNotifier) -> Harness {
        let store = MemoryStore::new();
        let gateway = Arc::new(FakeGateway::new(behavior));
        let notifier = Arc::new(notifier);
        let config = ServiceConfig {
            gateway_timeout: Duration::from_millis(50),
            webhook_secret: SECRET.to_string(),
            ..ServiceConfig::default()
        };
        let service = GiftingService::new(store.clone(), gateway.clone(), notifier.clone(), config)
            .with_clock(Arc::new(FixedClock(now())));

        Harness {
            service,
            store,
            gateway,
            notifier,
        }
    }

    fn harness() -> Harness {
        build(GatewayBehavior::Succeed, RecordingNotifier::default())
    }

    fn credits(v: i64) -> Credits {
        Credits::new(v).unwrap()
    }

    /// Opens a ledger and records the funding as a credit purchase.
    async fn fund(store: &MemoryStore, owner: OwnerId, balance: i64) {
        let mut unit = store.begin().await.unwrap();
        unit.open_ledger_for_update(owner, now()).await.unwrap();
        if balance > 0 {
            unit.credit(owner, credits(balance), now()).await.unwrap();
            unit.append(&Transaction::credit(
                owner,
                credits(balance),
                Money::new(balance * 20, Currency::USD).unwrap(),
                REASON_CREDIT_PURCHASE,
                None,
                now(),
            ))
            .await
            .unwrap();
        }
        unit.commit().await.unwrap();
    }

    /// Balance must equal the sum of the owner's transaction history.
    async fn assert_balance_matches_history(h: &Harness, owner: OwnerId) {
        let balance = h.service.get_ledger(owner).await.unwrap().balance_credits;
        let history: i64 = h
            .service
            .list_transactions(owner)
            .await
            .unwrap()
            .iter()
            .map(|tx| tx.amount_credits)
            .sum();
        assert_eq!(balance, history);
    }

    async fn catalog_entry(store: &MemoryStore, cost: i64, is_active: bool) -> CatalogEntryId {
        let entry = CatalogEntry {
            id: CatalogEntryId::new(),
            name: "Squeaky bone".into(),
            cost: credits(cost),
            is_active,
        };
        let id = entry.id;
        store.insert_catalog_entry(entry).await;
        id
    }

    async fn bundle(store: &MemoryStore, credit_count: i64, price: i64, is_active: bool) -> BundleId {
        let bundle = CreditBundle {
            id: BundleId::new(),
            name: "Starter".into(),
            credits: credits(credit_count),
            price: Money::new(price, Currency::USD).unwrap(),
            is_active,
        };
        let id = bundle.id;
        store.insert_credit_bundle(bundle).await;
        id
    }

    fn event(event_id: &str, event_type: &str, object: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": event_id,
            "type": event_type,
            "data": { "object": object }
        }))
        .unwrap()
    }

    fn completed_session(session_id: &str, record_id: ItemId, purpose: &str) -> serde_json::Value {
        json!({
            "id": session_id,
            "payment_intent": "pi_1",
            "payment_status": "paid",
            "metadata": { "record_id": record_id.to_string(), "purpose": purpose }
        })
    }

    async fn deliver(h: &Harness, body: &[u8]) -> Result<EventOutcome, AppError> {
        let signature = signature_header(now().timestamp(), body, SECRET);
        h.service.reconcile(body, Some(&signature)).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Settlement
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_settle_debits_frozen_price() {
        let h = harness();
        let owner = OwnerId::new();
        let target = TargetId::new();
        fund(&h.store, owner, 150).await;
        let entry = catalog_entry(&h.store, 100, true).await;

        let item = h.service.settle(owner, entry, target).await.unwrap();

        assert_eq!(item.status, ItemStatus::Paid);
        assert_eq!(item.purpose(), Purpose::Gift);
        assert_eq!(item.target_id, target);

        let ledger = h.service.get_ledger(owner).await.unwrap();
        assert_eq!(ledger.balance_credits, 50);

        let txs = h.service.list_transactions(owner).await.unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].transaction_type, TransactionType::Debit);
        assert_eq!(txs[0].amount_credits, -100);
        assert_eq!(txs[0].amount, -2000);
        assert_eq!(txs[0].reason, REASON_ITEM_PURCHASE);
        assert_eq!(
            txs[0].related.as_ref().map(|r| r.entity_id),
            Some(item.id.into_uuid())
        );
        assert_balance_matches_history(&h, owner).await;

        assert_eq!(
            h.notifier.sent(),
            vec![Notification::ItemPurchased {
                item_id: item.id,
                buyer_id: owner,
                target_id: target,
                price: credits(100),
            }]
        );
    }

    #[tokio::test]
    async fn test_settle_insufficient_balance_leaves_no_trace() {
        let h = harness();
        let owner = OwnerId::new();
        fund(&h.store, owner, 40).await;
        let entry = catalog_entry(&h.store, 100, true).await;

        let result = h.service.settle(owner, entry, TargetId::new()).await;

        assert!(matches!(
            result,
            Err(AppError::InsufficientBalance {
                required: 100,
                available: 40
            })
        ));
        assert_eq!(h.service.get_ledger(owner).await.unwrap().balance_credits, 40);
        assert_eq!(h.service.list_transactions(owner).await.unwrap().len(), 1);
        assert_balance_matches_history(&h, owner).await;
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_settle_without_wallet() {
        let h = harness();
        let entry = catalog_entry(&h.store, 100, true).await;

        let result = h.service.settle(OwnerId::new(), entry, TargetId::new()).await;

        assert!(matches!(result, Err(AppError::WalletNotFound)));
    }

    #[tokio::test]
    async fn test_settle_inactive_or_unknown_entry() {
        let h = harness();
        let owner = OwnerId::new();
        fund(&h.store, owner, 500).await;
        let inactive = catalog_entry(&h.store, 100, false).await;

        let result = h.service.settle(owner, inactive, TargetId::new()).await;
        assert!(matches!(result, Err(AppError::CatalogEntryNotFound)));

        let result = h
            .service
            .settle(owner, CatalogEntryId::new(), TargetId::new())
            .await;
        assert!(matches!(result, Err(AppError::CatalogEntryNotFound)));
        assert_eq!(h.service.get_ledger(owner).await.unwrap().balance_credits, 500);
    }

    #[tokio::test]
    async fn test_concurrent_spenders_cannot_overdraw() {
        let h = harness();
        let owner = OwnerId::new();
        fund(&h.store, owner, 150).await;
        let entry = catalog_entry(&h.store, 100, true).await;

        let (a, b) = tokio::join!(
            h.service.settle(owner, entry, TargetId::new()),
            h.service.settle(owner, entry, TargetId::new()),
        );

        let succeeded = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(succeeded, 1);
        assert!(
            matches!(a, Err(AppError::InsufficientBalance { .. }))
                || matches!(b, Err(AppError::InsufficientBalance { .. }))
        );

        assert_eq!(h.service.get_ledger(owner).await.unwrap().balance_credits, 50);
        assert_balance_matches_history(&h, owner).await;
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_fail_settlement() {
        let h = build(
            GatewayBehavior::Succeed,
            RecordingNotifier {
                fail: true,
                ..Default::default()
            },
        );
        let owner = OwnerId::new();
        fund(&h.store, owner, 100).await;
        let entry = catalog_entry(&h.store, 100, true).await;

        let item = h.service.settle(owner, entry, TargetId::new()).await.unwrap();

        assert!(item.is_paid());
        assert_eq!(h.service.get_ledger(owner).await.unwrap().balance_credits, 0);
    }

    #[tokio::test]
    async fn test_get_item_is_scoped_to_buyer() {
        let h = harness();
        let owner = OwnerId::new();
        fund(&h.store, owner, 100).await;
        let entry = catalog_entry(&h.store, 100, true).await;
        let item = h.service.settle(owner, entry, TargetId::new()).await.unwrap();

        assert_eq!(h.service.get_item(owner, item.id).await.unwrap().id, item.id);
        assert!(matches!(
            h.service.get_item(OwnerId::new(), item.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_ledger_of_unknown_owner_reads_zero() {
        let h = harness();

        let ledger = h.service.get_ledger(OwnerId::new()).await.unwrap();

        assert_eq!(ledger.balance_credits, 0);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Checkout
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_checkout_creates_pending_record() {
        let h = harness();
        let owner = OwnerId::new();
        let target = TargetId::new();

        let response = h.service.initiate_checkout(owner, target, 500).await.unwrap();

        assert_eq!(response.checkout_url, "https://pay.test/cs_1");
        let item = h.service.get_item(owner, response.record_id).await.unwrap();
        assert_eq!(item.status, ItemStatus::Pending);
        assert_eq!(item.purpose(), Purpose::Donation);
        assert_eq!(item.gateway_session_id.as_deref(), Some("cs_1"));

        let request = h.gateway.last_request();
        assert_eq!(request.record_id, response.record_id.to_string());
        assert_eq!(request.amount.amount(), 500);
        assert_eq!(request.credits, None);
    }

    #[tokio::test]
    async fn test_checkout_rejects_invalid_amounts() {
        let h = harness();
        let owner = OwnerId::new();
        let max = h.service.config().max_checkout_amount;

        for amount in [0, -5, max + 1] {
            let result = h
                .service
                .initiate_checkout(owner, TargetId::new(), amount)
                .await;
            assert!(
                matches!(result, Err(AppError::InvalidAmount(_))),
                "amount {} accepted",
                amount
            );
        }
        assert!(h.gateway.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_credit_purchase_targets_buyer() {
        let h = harness();
        let owner = OwnerId::new();
        let bundle_id = bundle(&h.store, 175, 3500, true).await;

        let response = h
            .service
            .initiate_credit_purchase(owner, bundle_id)
            .await
            .unwrap();

        let item = h.service.get_item(owner, response.record_id).await.unwrap();
        assert_eq!(item.purpose(), Purpose::CreditPurchase);
        assert_eq!(item.target_id.into_uuid(), owner.into_uuid());

        let request = h.gateway.last_request();
        assert_eq!(request.credits, Some(175));
        assert_eq!(request.amount.amount(), 3500);
    }

    #[tokio::test]
    async fn test_credit_purchase_of_inactive_bundle() {
        let h = harness();
        let inactive = bundle(&h.store, 175, 3500, false).await;

        let result = h
            .service
            .initiate_credit_purchase(OwnerId::new(), inactive)
            .await;

        assert!(matches!(result, Err(AppError::CatalogEntryNotFound)));
    }

    #[tokio::test]
    async fn test_gateway_failure_marks_record_failed() {
        let h = build(GatewayBehavior::Fail, RecordingNotifier::default());
        let owner = OwnerId::new();

        let result = h.service.initiate_checkout(owner, TargetId::new(), 500).await;

        assert!(matches!(result, Err(AppError::GatewayUnavailable(_))));
        let record_id: ItemId = h.gateway.last_request().record_id.parse().unwrap();
        let item = h.service.get_item(owner, record_id).await.unwrap();
        assert_eq!(item.status, ItemStatus::Failed);
    }

    #[tokio::test]
    async fn test_gateway_timeout_marks_record_failed() {
        let h = build(GatewayBehavior::Hang, RecordingNotifier::default());
        let owner = OwnerId::new();

        let result = h.service.initiate_checkout(owner, TargetId::new(), 500).await;

        assert!(matches!(result, Err(AppError::GatewayUnavailable(_))));
        let record_id: ItemId = h.gateway.last_request().record_id.parse().unwrap();
        let item = h.service.get_item(owner, record_id).await.unwrap();
        assert_eq!(item.status, ItemStatus::Failed);
        assert_eq!(item.gateway_session_id, None);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reconciliation
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_credit_purchase_webhook_is_idempotent() {
        let h = harness();
        let owner = OwnerId::new();
        let bundle_id = bundle(&h.store, 175, 3500, true).await;
        let checkout = h
            .service
            .initiate_credit_purchase(owner, bundle_id)
            .await
            .unwrap();

        let body = event(
            "evt_1",
            "checkout.session.completed",
            completed_session("cs_1", checkout.record_id, "credit_purchase"),
        );

        assert_eq!(deliver(&h, &body).await.unwrap(), EventOutcome::Applied);
        assert_eq!(deliver(&h, &body).await.unwrap(), EventOutcome::Duplicate);

        let ledger = h.service.get_ledger(owner).await.unwrap();
        assert_eq!(ledger.balance_credits, 175);

        let txs = h.service.list_transactions(owner).await.unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].transaction_type, TransactionType::Credit);
        assert_eq!(txs[0].amount_credits, 175);
        assert_eq!(txs[0].amount, 3500);
        assert_eq!(txs[0].reason, REASON_CREDIT_PURCHASE);

        let item = h.service.get_item(owner, checkout.record_id).await.unwrap();
        assert_eq!(item.status, ItemStatus::Paid);
        assert_eq!(item.gateway_charge_id.as_deref(), Some("pi_1"));

        let journal = h.store.gateway_event("evt_1").await.unwrap();
        assert_eq!(journal.attempts, 2);
        assert_eq!(journal.outcome, EventOutcome::Duplicate);
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_delivery_credits_once() {
        let h = harness();
        let owner = OwnerId::new();
        fund(&h.store, owner, 10).await;
        let bundle_id = bundle(&h.store, 175, 3500, true).await;
        let checkout = h
            .service
            .initiate_credit_purchase(owner, bundle_id)
            .await
            .unwrap();

        let body = event(
            "evt_1",
            "checkout.session.completed",
            completed_session("cs_1", checkout.record_id, "credit_purchase"),
        );

        let (a, b) = tokio::join!(deliver(&h, &body), deliver(&h, &body));
        let outcomes = [a.unwrap(), b.unwrap()];
        let applied = outcomes
            .iter()
            .filter(|o| **o == EventOutcome::Applied)
            .count();
        assert_eq!(applied, 1);
        assert!(outcomes.contains(&EventOutcome::Duplicate));

        let credits_from_bundle = h
            .service
            .list_transactions(owner)
            .await
            .unwrap()
            .iter()
            .filter(|tx| tx.amount_credits == 175)
            .count();
        assert_eq!(credits_from_bundle, 1);
        assert_eq!(h.service.get_ledger(owner).await.unwrap().balance_credits, 185);
        assert_balance_matches_history(&h, owner).await;
    }

    #[tokio::test]
    async fn test_metadata_cannot_inflate_credits() {
        let h = harness();
        let owner = OwnerId::new();
        let bundle_id = bundle(&h.store, 175, 3500, true).await;
        let checkout = h
            .service
            .initiate_credit_purchase(owner, bundle_id)
            .await
            .unwrap();

        let mut session = completed_session("cs_1", checkout.record_id, "credit_purchase");
        session["metadata"]["credits"] = json!("100000");
        let body = event("evt_1", "checkout.session.completed", session);

        assert_eq!(deliver(&h, &body).await.unwrap(), EventOutcome::Applied);
        assert_eq!(h.service.get_ledger(owner).await.unwrap().balance_credits, 175);
    }

    #[tokio::test]
    async fn test_donation_never_touches_ledger() {
        let h = harness();
        let owner = OwnerId::new();
        let target = TargetId::new();
        let checkout = h.service.initiate_checkout(owner, target, 500).await.unwrap();

        // Purpose in metadata is advisory; the record says donation.
        let body = event(
            "evt_1",
            "checkout.session.completed",
            completed_session("cs_1", checkout.record_id, "credit_purchase"),
        );

        assert_eq!(deliver(&h, &body).await.unwrap(), EventOutcome::Applied);
        assert!(h.store.get_ledger(owner).await.unwrap().is_none());
        assert!(h.service.list_transactions(owner).await.unwrap().is_empty());
        assert_eq!(
            h.service.get_item(owner, checkout.record_id).await.unwrap().status,
            ItemStatus::Paid
        );
        assert_eq!(
            h.notifier.sent(),
            vec![Notification::PaymentCompleted {
                item_id: checkout.record_id,
                buyer_id: owner,
                target_id: target,
                purpose: Purpose::Donation,
                amount: Money::new(500, Currency::USD).unwrap(),
            }]
        );
    }

    #[tokio::test]
    async fn test_paid_record_ignores_expiry() {
        let h = harness();
        let owner = OwnerId::new();
        let checkout = h
            .service
            .initiate_checkout(owner, TargetId::new(), 500)
            .await
            .unwrap();

        let completed = event(
            "evt_1",
            "checkout.session.completed",
            completed_session("cs_1", checkout.record_id, "donation"),
        );
        let expired = event("evt_2", "checkout.session.expired", json!({ "id": "cs_1" }));

        assert_eq!(deliver(&h, &completed).await.unwrap(), EventOutcome::Applied);
        assert_eq!(deliver(&h, &expired).await.unwrap(), EventOutcome::Duplicate);
        assert_eq!(
            h.service.get_item(owner, checkout.record_id).await.unwrap().status,
            ItemStatus::Paid
        );
    }

    #[tokio::test]
    async fn test_expiry_fails_pending_record() {
        let h = harness();
        let owner = OwnerId::new();
        let checkout = h
            .service
            .initiate_checkout(owner, TargetId::new(), 500)
            .await
            .unwrap();

        let expired = event("evt_1", "checkout.session.expired", json!({ "id": "cs_1" }));

        assert_eq!(deliver(&h, &expired).await.unwrap(), EventOutcome::Applied);
        assert_eq!(
            h.service.get_item(owner, checkout.record_id).await.unwrap().status,
            ItemStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_late_payment_after_timeout_is_applied() {
        let h = build(GatewayBehavior::Hang, RecordingNotifier::default());
        let owner = OwnerId::new();
        let bundle_id = bundle(&h.store, 175, 3500, true).await;

        let result = h.service.initiate_credit_purchase(owner, bundle_id).await;
        assert!(matches!(result, Err(AppError::GatewayUnavailable(_))));
        let record_id: ItemId = h.gateway.last_request().record_id.parse().unwrap();

        // The gateway did open a session the caller never heard about.
        let body = event(
            "evt_1",
            "checkout.session.completed",
            completed_session("cs_late", record_id, "credit_purchase"),
        );

        assert_eq!(deliver(&h, &body).await.unwrap(), EventOutcome::Applied);
        let item = h.service.get_item(owner, record_id).await.unwrap();
        assert_eq!(item.status, ItemStatus::Paid);
        assert_eq!(item.gateway_session_id.as_deref(), Some("cs_late"));
        assert_eq!(h.service.get_ledger(owner).await.unwrap().balance_credits, 175);
    }

    #[tokio::test]
    async fn test_unsettled_payment_stays_pending() {
        let h = harness();
        let owner = OwnerId::new();
        let checkout = h
            .service
            .initiate_checkout(owner, TargetId::new(), 500)
            .await
            .unwrap();

        let mut session = completed_session("cs_1", checkout.record_id, "donation");
        session["payment_status"] = json!("unpaid");
        let body = event("evt_1", "checkout.session.completed", session);

        assert_eq!(deliver(&h, &body).await.unwrap(), EventOutcome::Ignored);
        assert_eq!(
            h.service.get_item(owner, checkout.record_id).await.unwrap().status,
            ItemStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_unknown_record_is_acknowledged() {
        let h = harness();
        let body = event(
            "evt_1",
            "checkout.session.completed",
            json!({ "id": "cs_nobody", "payment_status": "paid" }),
        );

        assert_eq!(deliver(&h, &body).await.unwrap(), EventOutcome::UnknownRecord);
        assert!(h.store.gateway_event("evt_1").await.is_none());
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_unhandled_event_type_is_ignored() {
        let h = harness();
        let body = event("evt_1", "invoice.paid", json!({ "id": "in_1" }));

        assert_eq!(deliver(&h, &body).await.unwrap(), EventOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_bad_signatures_are_rejected() {
        let h = harness();
        let body = event(
            "evt_1",
            "checkout.session.completed",
            json!({ "id": "cs_1" }),
        );

        let stale = signature_header(now().timestamp() - 301, &body, SECRET);
        let forged = signature_header(now().timestamp(), &body, "whsec_other");

        for signature in [Some(stale.as_str()), Some(forged.as_str()), Some("garbage"), None] {
            assert!(matches!(
                h.service.reconcile(&body, signature).await,
                Err(AppError::InvalidSignature)
            ));
        }
        assert!(h.store.gateway_event("evt_1").await.is_none());
    }

    #[tokio::test]
    async fn test_tampered_body_is_rejected() {
        let h = harness();
        let body = event("evt_1", "checkout.session.completed", json!({ "id": "cs_1" }));
        let signature = signature_header(now().timestamp(), &body, SECRET);
        let mut tampered = body.clone();
        tampered.push(b' ');

        assert!(matches!(
            h.service.reconcile(&tampered, Some(&signature)).await,
            Err(AppError::InvalidSignature)
        ));
    }

    #[tokio::test]
    async fn test_signed_garbage_is_bad_request() {
        let h = harness();

        let result = deliver(&h, b"not json").await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));

        let body = event("evt_1", "checkout.session.completed", json!({ "nope": true }));
        let result = deliver(&h, &body).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }
}
