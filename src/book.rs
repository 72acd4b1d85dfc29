use std::sync::Arc;

use tracing::debug;

use crate::errors::BookError;
use crate::orders::{Leg, OrderRequest, PendingOrder};
use crate::store::Store;

/// What happened to a leg after a decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegOutcome {
    /// The leg survived with this remaining quantity.
    Updated(u64),
    /// The decrement consumed the leg; the whole record was deleted.
    Removed,
}

/// Owner of all pending-order state.
///
/// The book stores resting orders and exposes exactly the primitives the
/// matching pass needs: insert, snapshot, per-leg decrement, delete. Nothing
/// else mutates a resting order.
pub struct OrderBook {
    store: Arc<Store>,
}

impl OrderBook {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Validate and append a new pending order, returning its assigned id.
    ///
    /// Zero quantities and non-positive prices are rejected here so that the
    /// "both leg quantities are positive" invariant holds from the moment a
    /// row exists.
    pub fn insert(&self, req: &OrderRequest) -> Result<u64, BookError> {
        req.validate()?;
        let row = self.store.insert_pending(req)?;
        debug!(id = row.id, "pending order inserted");
        Ok(row.id)
    }

    /// Snapshot of all resting orders in insertion (ascending id) order.
    pub fn pending(&self) -> Result<Vec<PendingOrder>, BookError> {
        Ok(self.store.scan_pending()?)
    }

    /// Subtract `amount` from one leg of the order with `id`.
    ///
    /// If the leg's quantity would drop to zero or below, the whole record is
    /// deleted (both legs); otherwise the new quantity is persisted. Returns
    /// `NotFound` when no row with `id` exists; callers in the matching pass
    /// expect and tolerate that after the sibling leg deleted the row.
    pub fn decrement_or_remove(
        &self,
        id: u64,
        leg: Leg,
        amount: u64,
    ) -> Result<LegOutcome, BookError> {
        let Some(mut row) = self.store.read_pending(id)? else {
            return Err(BookError::NotFound(id));
        };
        let current = row.leg_qty(leg);
        if current <= amount {
            self.store.delete_pending(id)?;
            debug!(id, ?leg, "leg consumed, record removed");
            Ok(LegOutcome::Removed)
        } else {
            let remaining = current - amount;
            row.set_leg_qty(leg, remaining);
            self.store.put_pending(&row)?;
            debug!(id, ?leg, remaining, "leg decremented");
            Ok(LegOutcome::Updated(remaining))
        }
    }

    /// Delete a record outright.
    pub fn remove(&self, id: u64) -> Result<(), BookError> {
        if self.store.delete_pending(id)? {
            Ok(())
        } else {
            Err(BookError::NotFound(id))
        }
    }
}
