//! Spending credits on catalog items.

use gifting_types::{
    AppError, CatalogEntryId, LedgerStore, Notification, OwnerId, SettledItem, TargetId,
    Transaction, domain::REASON_ITEM_PURCHASE,
};

use super::{GiftingService, item_reference};

impl<S: LedgerStore> GiftingService<S> {
    /// Buys a catalog item for `target_id` with the buyer's credits.
    ///
    /// The price is resolved from the catalog, never from the caller. Lock,
    /// sufficiency check, debit, transaction and item are one atomic unit:
    /// any failure leaves no trace.
    #[tracing::instrument(
        skip(self),
        fields(buyer_id = %buyer_id, catalog_entry_id = %catalog_entry_id, target_id = %target_id)
    )]
    pub async fn settle(
        &self,
        buyer_id: OwnerId,
        catalog_entry_id: CatalogEntryId,
        target_id: TargetId,
    ) -> Result<SettledItem, AppError> {
        let entry = self
            .store
            .get_catalog_entry(catalog_entry_id)
            .await?
            .filter(|entry| entry.is_active)
            .ok_or(AppError::CatalogEntryNotFound)?;
        let price = entry.cost;
        let cash_value = self.credits_cash_value(price)?;
        let now = self.clock.now();

        let mut unit = self.store.begin().await?;

        let ledger = unit
            .ledger_for_update(buyer_id)
            .await?
            .ok_or(AppError::WalletNotFound)?;

        if !ledger.has_sufficient_balance(price) {
            tracing::info!(
                required = price.value(),
                available = ledger.balance.value(),
                "Insufficient balance"
            );
            return Err(AppError::InsufficientBalance {
                required: price.value(),
                available: ledger.balance.value(),
            });
        }

        let item = SettledItem::paid_gift(buyer_id, target_id, entry.id, price, now);
        unit.insert_item(&item).await?;
        unit.debit(buyer_id, price, now).await?;
        unit.append(&Transaction::debit(
            buyer_id,
            price,
            cash_value,
            REASON_ITEM_PURCHASE,
            item_reference(item.id),
            now,
        ))
        .await?;
        unit.commit().await?;

        tracing::info!(item_id = %item.id, price = price.value(), "Item settled");

        self.dispatch(Notification::ItemPurchased {
            item_id: item.id,
            buyer_id,
            target_id,
            price,
        })
        .await;

        Ok(item)
    }
}
