//! Applying signed gateway callbacks.
//!
//! Delivery is at-least-once and unordered. Every transition runs inside the
//! unit that holds the record's row lock, and `paid` is terminal, so
//! redelivery can never credit twice.

use gifting_repo::security::verify_signature;
use gifting_types::{
    AppError, DomainError, EventOutcome, GatewayEvent, GatewayEventKind, GatewayEventRecord,
    ItemId, ItemKind, LedgerStore, LedgerUnit, Notification, Purpose, RepoError, SettledItem,
    Transaction, Transition,
    domain::{CheckoutSessionObject, REASON_CREDIT_PURCHASE},
};

use super::{GiftingService, item_reference};

impl<S: LedgerStore> GiftingService<S> {
    /// Verifies, parses and applies one gateway callback.
    ///
    /// Unknown records, duplicates and unhandled event types are successes.
    /// Only signature and payload problems (`InvalidSignature`, `BadRequest`)
    /// and storage failures are errors.
    #[tracing::instrument(skip(self, payload, signature), fields(event_id, event_type, session_id))]
    pub async fn reconcile(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<EventOutcome, AppError> {
        let now = self.clock.now();

        verify_signature(
            signature,
            payload,
            &self.config.webhook_secret,
            now.timestamp(),
            self.config.webhook_tolerance_secs,
        )
        .map_err(|e| {
            tracing::warn!(reason = %e, "Rejected gateway callback signature");
            AppError::InvalidSignature
        })?;

        let event: GatewayEvent = serde_json::from_slice(payload)
            .map_err(|e| AppError::BadRequest(format!("Unparseable gateway event: {}", e)))?;

        let span = tracing::Span::current();
        span.record("event_id", event.id.as_str());
        span.record("event_type", event.event_type.as_str());

        let kind = GatewayEventKind::from_type(&event.event_type);
        let session = match kind {
            GatewayEventKind::Unhandled => None,
            _ => Some(
                event
                    .checkout_session()
                    .map_err(|e| AppError::BadRequest(e.to_string()))?,
            ),
        };
        if let Some(session) = &session {
            span.record("session_id", session.id.as_str());
        }

        let result = match (kind, &session) {
            (GatewayEventKind::CheckoutCompleted, Some(session)) => {
                self.complete_checkout(session).await
            }
            (GatewayEventKind::CheckoutExpired, Some(session)) => {
                self.expire_checkout(session).await
            }
            _ => {
                tracing::debug!("Ignoring unhandled gateway event type");
                Ok(EventOutcome::Ignored)
            }
        };

        self.journal(&event, session.map(|s| s.id), &result).await;

        result.map_err(Into::into)
    }

    async fn complete_checkout(
        &self,
        session: &CheckoutSessionObject,
    ) -> Result<EventOutcome, RepoError> {
        let now = self.clock.now();
        let mut unit = self.store.begin().await?;

        let Some(mut item) = find_record(unit.as_mut(), session).await? else {
            tracing::info!("No local record for completed checkout");
            return Ok(EventOutcome::UnknownRecord);
        };

        if item.is_paid() {
            tracing::debug!(item_id = %item.id, "Record already paid");
            return Ok(EventOutcome::Duplicate);
        }

        if !session.payment_settled() {
            tracing::info!(
                item_id = %item.id,
                payment_status = session.payment_status.as_deref().unwrap_or_default(),
                "Payment not settled yet, leaving record pending"
            );
            return Ok(EventOutcome::Ignored);
        }

        warn_on_metadata_mismatch(&item, session);

        item.attach_session(&session.id)?;
        if item.mark_paid(session.payment_intent.clone(), now) == Transition::Unchanged {
            return Ok(EventOutcome::Duplicate);
        }

        match unit.update_item(&item).await {
            Err(RepoError::Domain(DomainError::AlreadySettled(_))) => {
                return Ok(EventOutcome::Duplicate);
            }
            other => other?,
        }

        if let ItemKind::CreditPurchase {
            credits, amount, ..
        } = &item.kind
        {
            unit.open_ledger_for_update(item.buyer_id, now).await?;
            unit.credit(item.buyer_id, *credits, now).await?;
            unit.append(&Transaction::credit(
                item.buyer_id,
                *credits,
                *amount,
                REASON_CREDIT_PURCHASE,
                item_reference(item.id),
                now,
            ))
            .await?;
        }

        unit.commit().await?;

        tracing::info!(
            item_id = %item.id,
            buyer_id = %item.buyer_id,
            purpose = %item.purpose(),
            "Checkout completed"
        );

        if let Some(amount) = item.kind.cash_amount() {
            self.dispatch(Notification::PaymentCompleted {
                item_id: item.id,
                buyer_id: item.buyer_id,
                target_id: item.target_id,
                purpose: item.purpose(),
                amount,
            })
            .await;
        }

        Ok(EventOutcome::Applied)
    }

    async fn expire_checkout(
        &self,
        session: &CheckoutSessionObject,
    ) -> Result<EventOutcome, RepoError> {
        let now = self.clock.now();
        let mut unit = self.store.begin().await?;

        let Some(mut item) = find_record(unit.as_mut(), session).await? else {
            tracing::info!("No local record for expired checkout");
            return Ok(EventOutcome::UnknownRecord);
        };

        if item.mark_failed(now) == Transition::Unchanged {
            tracing::debug!(item_id = %item.id, status = %item.status, "Record already terminal");
            return Ok(EventOutcome::Duplicate);
        }

        unit.update_item(&item).await?;
        unit.commit().await?;

        tracing::info!(item_id = %item.id, "Checkout expired");
        Ok(EventOutcome::Applied)
    }

    /// Best-effort audit entry; idempotency never depends on it.
    async fn journal(
        &self,
        event: &GatewayEvent,
        session_id: Option<String>,
        result: &Result<EventOutcome, RepoError>,
    ) {
        let outcome = match result {
            // Unknown records leave no trace in the store.
            Ok(EventOutcome::UnknownRecord) => return,
            Ok(outcome) => *outcome,
            Err(_) => EventOutcome::Failed,
        };
        let mut record = GatewayEventRecord::new(
            event.id.clone(),
            event.event_type.clone(),
            session_id,
            outcome,
            self.clock.now(),
        );
        if let Err(e) = result {
            tracing::error!(error = %e, "Gateway callback failed");
            record = record.with_error(e.to_string());
        }

        if let Err(e) = self.store.record_gateway_event(&record).await {
            tracing::warn!(error = %e, "Failed to journal gateway event");
        }
    }
}

/// Locks the record a checkout session belongs to.
///
/// Looks up by session id first, then by the `record_id` echoed in metadata:
/// the session id is never persisted when the initiating call timed out.
async fn find_record(
    unit: &mut dyn LedgerUnit,
    session: &CheckoutSessionObject,
) -> Result<Option<SettledItem>, RepoError> {
    if let Some(item) = unit.item_for_update_by_session(&session.id).await? {
        return Ok(Some(item));
    }

    let Some(record_id) = session.metadata.record_id.as_deref() else {
        return Ok(None);
    };
    let Ok(id) = record_id.parse::<ItemId>() else {
        tracing::warn!(record_id, "Unparseable record id in checkout metadata");
        return Ok(None);
    };

    match unit.item_for_update(id).await? {
        Some(item)
            if item
                .gateway_session_id
                .as_deref()
                .is_some_and(|bound| bound != session.id) =>
        {
            tracing::warn!(item_id = %item.id, "Record is bound to another session");
            Ok(None)
        }
        found => Ok(found),
    }
}

/// The local record decides purpose and credits; metadata is only advisory.
fn warn_on_metadata_mismatch(item: &SettledItem, session: &CheckoutSessionObject) {
    let metadata = &session.metadata;

    if let Some(purpose) = metadata.purpose.as_deref() {
        if purpose.parse::<Purpose>().ok() != Some(item.purpose()) {
            tracing::warn!(
                item_id = %item.id,
                metadata_purpose = purpose,
                record_purpose = %item.purpose(),
                "Checkout metadata purpose disagrees with record"
            );
        }
    }

    if let (Some(claimed), ItemKind::CreditPurchase { credits, .. }) =
        (metadata.credits(), &item.kind)
    {
        if claimed != credits.value() {
            tracing::warn!(
                item_id = %item.id,
                metadata_credits = claimed,
                record_credits = credits.value(),
                "Checkout metadata credits disagree with record"
            );
        }
    }
}
