use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use bincode::{
    config,
    error::{DecodeError, EncodeError},
};
use parity_db::{ColId, Db, Options};
use serde_json::{self};
use std::{
    path::Path,
    sync::atomic::{AtomicU64, Ordering},
};
use thiserror::Error;

use crate::orders::{OrderRequest, PendingOrder};
use crate::trade::Trade;

/// Column holding resting orders, keyed by big-endian id.
const PENDING_COL: ColId = 0;
/// Column holding the append-only trade log, keyed the same way.
const TRADES_COL: ColId = 1;

//Cursor (opaque to clients)
#[derive(serde::Serialize, serde::Deserialize)]
struct Cursor {
    id: u64,
}

/// Errors from the key/value store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("ParityDB error: {0}")]
    Parity(#[from] parity_db::Error),
    #[error("Serialization/Deserialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Bincode encode error: {0}")]
    BincodeEncode(#[from] EncodeError),

    #[error("Bincode decode error: {0}")]
    BincodeDecode(#[from] DecodeError),

    #[error("Invalid cursor")]
    BadCursor,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// ParityDB-backed store for the order book: one column of pending orders,
/// one column of completed trades.
///
/// Keys are `u64` ids encoded big-endian so the B-tree iterates in insertion
/// order. Ids come from in-process counters seeded with the highest key found
/// at open, which keeps them monotone across restarts and never reused.
pub struct Store {
    db: Db,
    next_order_id: AtomicU64,
    next_trade_id: AtomicU64,
}

impl Store {
    /// Open (or create) a ParityDB at `path`, with B-tree indexed columns for
    /// pending orders and trades.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let mut opts = Options::with_columns(path.as_ref(), 2);
        // B-tree indexes so full scans come back in ascending-id order
        opts.columns[PENDING_COL as usize].btree_index = true;
        opts.columns[TRADES_COL as usize].btree_index = true;
        let db = Db::open_or_create(&opts)?;
        let next_order_id = AtomicU64::new(Self::max_id(&db, PENDING_COL)? + 1);
        let next_trade_id = AtomicU64::new(Self::max_id(&db, TRADES_COL)? + 1);
        Ok(Store {
            db,
            next_order_id,
            next_trade_id,
        })
    }

    fn max_id(db: &Db, col: ColId) -> StoreResult<u64> {
        let mut iter = db.iter(col)?;
        iter.seek_to_first()?;
        let mut max = 0u64;
        while let Some((key, _)) = iter.next()? {
            if let Ok(raw) = <[u8; 8]>::try_from(&key[..]) {
                max = max.max(u64::from_be_bytes(raw));
            }
        }
        Ok(max)
    }

    #[inline]
    fn key(id: u64) -> Vec<u8> {
        id.to_be_bytes().to_vec()
    }

    #[inline]
    fn encode_cursor(c: &Cursor) -> StoreResult<String> {
        Ok(B64.encode(serde_json::to_vec(c)?))
    }

    #[inline]
    fn decode_cursor(s: &str) -> StoreResult<Cursor> {
        let bytes = B64.decode(s).map_err(|_| StoreError::BadCursor)?;
        serde_json::from_slice(&bytes).map_err(|_| StoreError::BadCursor)
    }

    /// Insert a new pending order, assigning the next id. Returns the stored row.
    pub fn insert_pending(&self, req: &OrderRequest) -> StoreResult<PendingOrder> {
        let id = self.next_order_id.fetch_add(1, Ordering::SeqCst);
        let row = PendingOrder {
            id,
            buyer_qty: req.buyer_qty,
            buyer_price: req.buyer_price,
            seller_price: req.seller_price,
            seller_qty: req.seller_qty,
        };
        let value = bincode::encode_to_vec(row, config::standard())?;
        self.db
            .commit(vec![(PENDING_COL, Self::key(id), Some(value))])?;
        Ok(row)
    }

    /// Point read of a pending order.
    pub fn read_pending(&self, id: u64) -> StoreResult<Option<PendingOrder>> {
        match self.db.get(PENDING_COL, &Self::key(id))? {
            Some(raw) => {
                let (row, _): (PendingOrder, usize) =
                    bincode::decode_from_slice(&raw, config::standard())?;
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }

    /// Overwrite a pending order in place (same id).
    pub fn put_pending(&self, row: &PendingOrder) -> StoreResult<()> {
        let value = bincode::encode_to_vec(row, config::standard())?;
        self.db
            .commit(vec![(PENDING_COL, Self::key(row.id), Some(value))])?;
        Ok(())
    }

    /// Delete a pending order. Returns whether the row existed.
    pub fn delete_pending(&self, id: u64) -> StoreResult<bool> {
        let key = Self::key(id);
        let existed = self.db.get(PENDING_COL, &key)?.is_some();
        if existed {
            self.db.commit(vec![(PENDING_COL, key, None)])?;
        }
        Ok(existed)
    }

    /// Full scan of pending orders, ascending id.
    pub fn scan_pending(&self) -> StoreResult<Vec<PendingOrder>> {
        let mut iter = self.db.iter(PENDING_COL)?;
        iter.seek_to_first()?;
        let mut rows = Vec::new();
        while let Some((_key, raw)) = iter.next()? {
            let (row, _): (PendingOrder, usize) =
                bincode::decode_from_slice(&raw, config::standard())?;
            rows.push(row);
        }
        Ok(rows)
    }

    /// Append a trade under the next trade id. The id on the argument is
    /// ignored; the stored row is returned with the assigned one.
    pub fn append_trade(&self, trade: &Trade) -> StoreResult<Trade> {
        let id = self.next_trade_id.fetch_add(1, Ordering::SeqCst);
        let row = Trade { id, ..*trade };
        let value = bincode::encode_to_vec(row, config::standard())?;
        self.db
            .commit(vec![(TRADES_COL, Self::key(id), Some(value))])?;
        Ok(row)
    }

    /// Full scan of the trade log, ascending id.
    pub fn scan_trades(&self) -> StoreResult<Vec<Trade>> {
        let mut iter = self.db.iter(TRADES_COL)?;
        iter.seek_to_first()?;
        let mut rows = Vec::new();
        while let Some((_key, raw)) = iter.next()? {
            let (row, _): (Trade, usize) = bincode::decode_from_slice(&raw, config::standard())?;
            rows.push(row);
        }
        Ok(rows)
    }

    /// Page through the trade log in ascending id order.
    ///
    /// `after` is an opaque cursor returned by a previous page. A cursor that
    /// does not name a persisted trade is rejected with [`StoreError::BadCursor`].
    pub fn page_trades_asc(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> StoreResult<(Vec<Trade>, Option<String>)> {
        let mut it = self.db.iter(TRADES_COL)?;
        match after {
            Some(s) => {
                let c = Self::decode_cursor(s)?;
                let key = Self::key(c.id);
                if self.db.get(TRADES_COL, &key)?.is_none() {
                    return Err(StoreError::BadCursor);
                }
                // Start strictly after the cursor's own row
                it.seek(&key)?;
                let _ = it.next()?;
            }
            None => it.seek_to_first()?,
        }

        let mut items = Vec::with_capacity(limit.min(256));
        let mut last_cursor: Option<String> = None;

        while items.len() < limit {
            match it.next()? {
                Some((_key, raw)) => {
                    let (trade, _): (Trade, usize) =
                        bincode::decode_from_slice(&raw, config::standard())?;
                    last_cursor = Some(Self::encode_cursor(&Cursor { id: trade.id })?);
                    items.push(trade);
                }
                None => break,
            }
        }

        Ok((items, last_cursor))
    }

    /// Drop every row in both columns and reset the id counters.
    ///
    /// Only the server's `--fresh` flag reaches this; nothing in the matching
    /// path ever wipes.
    pub fn wipe(&self) -> StoreResult<()> {
        for col in [PENDING_COL, TRADES_COL] {
            let mut iter = self.db.iter(col)?;
            iter.seek_to_first()?;
            let mut batch = Vec::new();
            while let Some((key, _)) = iter.next()? {
                batch.push((col, key, None));
            }
            if !batch.is_empty() {
                self.db.commit(batch)?;
            }
        }
        self.next_order_id.store(1, Ordering::SeqCst);
        self.next_trade_id.store(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn req(buyer_qty: u64, buyer_price: f64, seller_price: f64, seller_qty: u64) -> OrderRequest {
        OrderRequest {
            buyer_qty,
            buyer_price,
            seller_price,
            seller_qty,
        }
    }

    fn trade(price: f64) -> Trade {
        Trade {
            id: 0,
            buyer_price: 10.0,
            seller_price: 9.0,
            buyer_qty: 5,
            seller_qty: 5,
            qty: 5,
            price,
        }
    }

    #[test]
    fn test_ids_are_monotone_and_survive_reopen() {
        let dir = tempdir().unwrap();

        {
            let store = Store::open(dir.path()).unwrap();
            let a = store.insert_pending(&req(1, 10.0, 11.0, 1)).unwrap();
            let b = store.insert_pending(&req(2, 10.0, 11.0, 2)).unwrap();
            assert_eq!(a.id, 1);
            assert_eq!(b.id, 2);
        }

        // Reopen: the counter resumes past the highest persisted key, and a
        // deleted id is never handed out again within the same run.
        {
            let store = Store::open(dir.path()).unwrap();
            assert!(store.delete_pending(2).unwrap());
            let c = store.insert_pending(&req(3, 10.0, 11.0, 3)).unwrap();
            assert_eq!(c.id, 3);
        }
    }

    #[test]
    fn test_pending_crud_roundtrip() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();

        let row = store.insert_pending(&req(5, 10.0, 9.0, 5)).unwrap();
        let read = store.read_pending(row.id).unwrap().unwrap();
        assert_eq!(read.buyer_qty, 5);
        assert_eq!(read.buyer_price, 10.0);

        let updated = PendingOrder {
            buyer_qty: 3,
            ..read
        };
        store.put_pending(&updated).unwrap();
        assert_eq!(store.read_pending(row.id).unwrap().unwrap().buyer_qty, 3);

        assert!(store.delete_pending(row.id).unwrap());
        assert!(!store.delete_pending(row.id).unwrap());
        assert!(store.read_pending(row.id).unwrap().is_none());
    }

    #[test]
    fn test_scan_pending_ascending_id() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();

        for qty in 1..=5u64 {
            store.insert_pending(&req(qty, 10.0, 11.0, qty)).unwrap();
        }
        let ids: Vec<u64> = store.scan_pending().unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_paging_two_items_limit_one() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();

        store.append_trade(&trade(9.5)).unwrap();
        store.append_trade(&trade(9.0)).unwrap();

        let (p1, c1) = store.page_trades_asc(None, 1).unwrap();
        assert_eq!(p1.len(), 1);
        assert_eq!(p1[0].id, 1); // ascending by id

        let (p2, c2) = store.page_trades_asc(c1.as_deref(), 1).unwrap();
        assert_eq!(p2.len(), 1);
        assert_eq!(p2[0].id, 2);

        let (p3, c3) = store.page_trades_asc(c2.as_deref(), 1).unwrap();
        assert!(p3.is_empty());
        assert!(c3.is_none());
    }

    #[test]
    fn test_bad_cursor_malformed() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();

        // Not base64 at all
        assert!(matches!(
            store.page_trades_asc(Some("!!!notbase64!!!"), 10),
            Err(StoreError::BadCursor)
        ));

        // Base64 but not valid JSON
        let c2 = B64.encode(b"\xFF\xFE\xFD");
        assert!(matches!(
            store.page_trades_asc(Some(&c2), 10),
            Err(StoreError::BadCursor)
        ));

        // Valid JSON but wrong shape for Cursor
        let c3 = B64.encode(serde_json::to_vec(&serde_json::json!({"x": 1})).unwrap());
        assert!(matches!(
            store.page_trades_asc(Some(&c3), 10),
            Err(StoreError::BadCursor)
        ));
    }

    #[test]
    fn test_bad_cursor_nonexistent_id() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();

        store.append_trade(&trade(9.5)).unwrap();

        // Well-formed cursor naming an id that was never persisted
        let bogus = B64.encode(serde_json::to_vec(&serde_json::json!({"id": 999u64})).unwrap());
        assert!(matches!(
            store.page_trades_asc(Some(&bogus), 10),
            Err(StoreError::BadCursor)
        ));
    }

    #[test]
    fn test_wipe_clears_rows_and_resets_ids() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();

        store.insert_pending(&req(1, 10.0, 11.0, 1)).unwrap();
        store.append_trade(&trade(9.5)).unwrap();

        store.wipe().unwrap();
        assert!(store.scan_pending().unwrap().is_empty());
        assert!(store.scan_trades().unwrap().is_empty());
        assert_eq!(store.insert_pending(&req(1, 10.0, 11.0, 1)).unwrap().id, 1);
    }
}
