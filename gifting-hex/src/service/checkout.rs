//! Opening cash checkouts.
//!
//! A pending record is committed before the gateway is called, so a crash or
//! timeout afterwards leaves an inert record and no money moved.

use gifting_types::{
    AppError, BundleId, CheckoutResponse, CheckoutSessionRequest, ItemKind, LedgerStore, Money,
    OwnerId, RepoError, SettledItem, TargetId, Transition,
};

use super::GiftingService;

impl<S: LedgerStore> GiftingService<S> {
    /// Opens a checkout for a one-off donation to `target_id`.
    #[tracing::instrument(skip(self), fields(buyer_id = %buyer_id, target_id = %target_id))]
    pub async fn initiate_checkout(
        &self,
        buyer_id: OwnerId,
        target_id: TargetId,
        amount: i64,
    ) -> Result<CheckoutResponse, AppError> {
        let amount = self.checkout_amount(amount)?;
        let item = SettledItem::pending(
            buyer_id,
            target_id,
            ItemKind::Donation { amount },
            self.clock.now(),
        );
        let description = format!("Donation of {}", amount);

        self.open_checkout(item, description).await
    }

    /// Opens a checkout for a credit bundle. The buyer is also the target.
    #[tracing::instrument(skip(self), fields(buyer_id = %buyer_id, bundle_id = %bundle_id))]
    pub async fn initiate_credit_purchase(
        &self,
        buyer_id: OwnerId,
        bundle_id: BundleId,
    ) -> Result<CheckoutResponse, AppError> {
        let bundle = self
            .store
            .get_credit_bundle(bundle_id)
            .await?
            .filter(|bundle| bundle.is_active)
            .ok_or(AppError::CatalogEntryNotFound)?;
        let amount = Money::positive(bundle.price.amount(), bundle.price.currency())?;

        let item = SettledItem::pending(
            buyer_id,
            TargetId::from_uuid(buyer_id.into_uuid()),
            ItemKind::CreditPurchase {
                bundle_id: bundle.id,
                credits: bundle.credits,
                amount,
            },
            self.clock.now(),
        );
        let description = format!("{} ({} credits)", bundle.name, bundle.credits);

        self.open_checkout(item, description).await
    }

    fn checkout_amount(&self, amount: i64) -> Result<Money, AppError> {
        if amount > self.config.max_checkout_amount {
            return Err(AppError::InvalidAmount(format!(
                "amount exceeds maximum of {}",
                self.config.max_checkout_amount
            )));
        }
        Money::positive(amount, self.config.currency).map_err(Into::into)
    }

    async fn open_checkout(
        &self,
        item: SettledItem,
        description: String,
    ) -> Result<CheckoutResponse, AppError> {
        let amount = item
            .kind
            .cash_amount()
            .ok_or_else(|| AppError::Internal("checkout record without cash amount".into()))?;
        let credits = match &item.kind {
            ItemKind::CreditPurchase { credits, .. } => Some(credits.value()),
            _ => None,
        };

        let mut unit = self.store.begin().await?;
        unit.insert_item(&item).await?;
        unit.commit().await?;

        let request = CheckoutSessionRequest {
            record_id: item.id.to_string(),
            purpose: item.purpose(),
            amount,
            credits,
            description,
        };

        let outcome = tokio::time::timeout(
            self.config.gateway_timeout,
            self.gateway.create_checkout_session(request),
        )
        .await;

        let session = match outcome {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                tracing::warn!(item_id = %item.id, error = %e, "Gateway refused checkout");
                self.fail_checkout(&item).await;
                return Err(AppError::GatewayUnavailable(e.to_string()));
            }
            Err(_) => {
                tracing::warn!(
                    item_id = %item.id,
                    timeout = ?self.config.gateway_timeout,
                    "Gateway call timed out"
                );
                self.fail_checkout(&item).await;
                return Err(AppError::GatewayUnavailable("gateway timed out".into()));
            }
        };

        let mut unit = self.store.begin().await?;
        let mut current = unit
            .item_for_update(item.id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("checkout record {} vanished", item.id)))?;

        // A fast completion webhook may already have bound the session.
        if current.gateway_session_id.as_deref() != Some(session.session_id.as_str()) {
            current.attach_session(&session.session_id)?;
            unit.update_item(&current).await?;
            unit.commit().await?;
        }

        tracing::info!(
            item_id = %item.id,
            session_id = %session.session_id,
            purpose = %item.purpose(),
            "Checkout session opened"
        );

        Ok(CheckoutResponse {
            record_id: item.id,
            checkout_url: session.checkout_url,
        })
    }

    /// Marks a pending checkout record failed. Errors are logged only: the
    /// caller already reports the gateway failure.
    async fn fail_checkout(&self, item: &SettledItem) {
        let now = self.clock.now();
        let result = async {
            let mut unit = self.store.begin().await?;
            if let Some(mut current) = unit.item_for_update(item.id).await? {
                if current.mark_failed(now) == Transition::Applied {
                    unit.update_item(&current).await?;
                    unit.commit().await?;
                }
            }
            Ok::<_, RepoError>(())
        }
        .await;

        if let Err(e) = result {
            tracing::error!(item_id = %item.id, error = %e, "Failed to mark checkout failed");
        }
    }
}
