use std::sync::Arc;

use tracing::debug;

use crate::errors::BookError;
use crate::orders::PendingOrder;
use crate::store::{Store, StoreResult};

/// An immutable record of one settlement event.
///
/// The four leg fields are the originating pending order's values at the
/// moment it was captured for matching, not the post-decrement values. `qty`
/// is the smaller of the two leg quantities; `price` the midpoint of the two
/// leg prices.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, bincode::Encode, bincode::Decode)]
pub struct Trade {
    pub id: u64,
    pub buyer_price: f64,
    pub seller_price: f64,
    pub buyer_qty: u64,
    pub seller_qty: u64,
    pub qty: u64,
    pub price: f64,
}

/// Append-only view over the trade column of the store.
///
/// Trades are written once during settlement and never updated or deleted.
pub struct TradeLog {
    store: Arc<Store>,
}

impl TradeLog {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Record the settlement of `row` and return the persisted trade.
    pub fn append(&self, row: &PendingOrder, qty: u64, price: f64) -> Result<Trade, BookError> {
        let trade = self.store.append_trade(&Trade {
            id: 0, // assigned by the store
            buyer_price: row.buyer_price,
            seller_price: row.seller_price,
            buyer_qty: row.buyer_qty,
            seller_qty: row.seller_qty,
            qty,
            price,
        })?;
        debug!(trade_id = trade.id, order_id = row.id, qty, price, "trade recorded");
        Ok(trade)
    }

    /// Every trade ever settled, ascending id.
    pub fn all(&self) -> Result<Vec<Trade>, BookError> {
        Ok(self.store.scan_trades()?)
    }

    /// One page of trade history; see [`Store::page_trades_asc`].
    pub fn page(&self, after: Option<&str>, limit: usize) -> StoreResult<(Vec<Trade>, Option<String>)> {
        self.store.page_trades_asc(after, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_append_snapshots_row_values() {
        let dir = tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path()).unwrap());
        let log = TradeLog::new(store);

        let row = PendingOrder {
            id: 7,
            buyer_qty: 10,
            buyer_price: 10.0,
            seller_price: 8.0,
            seller_qty: 4,
        };
        let trade = log.append(&row, row.fill_qty(), row.clearing_price()).unwrap();

        assert_eq!(trade.id, 1);
        assert_eq!(trade.buyer_qty, 10);
        assert_eq!(trade.seller_qty, 4);
        assert_eq!(trade.qty, 4);
        assert_eq!(trade.price, 9.0);

        let all = log.all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, trade.id);
    }
}
