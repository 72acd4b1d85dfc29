//! The matching pass: find crossed records and settle them into trades.
//!
//! Runs synchronously after every successful insert, under the same lock as
//! the insert, so two submissions never interleave their scan/decrement
//! sequences. One pass over a pre-pass snapshot is enough: a single
//! submission adds at most one newly crossed record, and records settle
//! independently of each other.

use tracing::{debug, info, warn};

use crate::book::{LegOutcome, OrderBook};
use crate::errors::BookError;
use crate::orders::{Leg, PendingOrder};
use crate::trade::{Trade, TradeLog};

/// Scan the book for crossed records and settle each one.
///
/// Returns the trades recorded this pass. A record that fails to settle is
/// logged and abandoned; the pass carries on with the rest. Failures here are
/// never surfaced to the submitter, whose order was already accepted.
pub fn match_once(book: &OrderBook, log: &TradeLog) -> Vec<Trade> {
    let snapshot: Vec<PendingOrder> = match book.pending() {
        Ok(rows) => rows.into_iter().filter(PendingOrder::is_crossed).collect(),
        Err(e) => {
            warn!("matching pass skipped, could not scan the book: {e}");
            return Vec::new();
        }
    };

    let mut trades = Vec::with_capacity(snapshot.len());
    for row in &snapshot {
        match settle(book, log, row) {
            Ok(trade) => {
                info!(
                    order_id = row.id,
                    trade_id = trade.id,
                    qty = trade.qty,
                    price = trade.price,
                    "settled"
                );
                trades.push(trade);
            }
            Err(e) => warn!(order_id = row.id, "settlement abandoned: {e}"),
        }
    }
    trades
}

/// Settle one crossed record: record the trade, then decrement both legs.
///
/// Both decrements are computed from the snapshot quantities and addressed to
/// the original id. The smaller leg always reaches zero, which deletes the
/// record; the other leg's decrement then finds nothing and is treated as the
/// expected no-op rather than an error.
fn settle(book: &OrderBook, log: &TradeLog, row: &PendingOrder) -> Result<Trade, BookError> {
    let qty = row.fill_qty();
    let price = row.clearing_price();

    // Written first: if this fails the record is left untouched for a later pass.
    let trade = log.append(row, qty, price)?;

    for leg in [Leg::Buyer, Leg::Seller] {
        match book.decrement_or_remove(row.id, leg, qty) {
            Ok(LegOutcome::Updated(remaining)) => {
                debug!(order_id = row.id, ?leg, remaining, "partial fill")
            }
            Ok(LegOutcome::Removed) => debug!(order_id = row.id, ?leg, "record consumed"),
            // The sibling leg already deleted the record
            Err(BookError::NotFound(_)) => debug!(order_id = row.id, ?leg, "record already gone"),
            Err(e) => return Err(e),
        }
    }
    Ok(trade)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::orders::OrderRequest;
    use crate::store::Store;
    use tempfile::tempdir;

    fn fixture() -> (OrderBook, TradeLog, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path()).unwrap());
        (
            OrderBook::new(store.clone()),
            TradeLog::new(store),
            dir,
        )
    }

    fn req(buyer_qty: u64, buyer_price: f64, seller_price: f64, seller_qty: u64) -> OrderRequest {
        OrderRequest {
            buyer_qty,
            buyer_price,
            seller_price,
            seller_qty,
        }
    }

    #[test]
    fn test_no_match_when_spread_is_open() {
        let (book, log, _tmp) = fixture();
        book.insert(&req(1, 5.0, 7.0, 1)).unwrap();

        let trades = match_once(&book, &log);

        assert!(trades.is_empty());
        assert_eq!(book.pending().unwrap().len(), 1);
        assert!(log.all().unwrap().is_empty());
    }

    #[test]
    fn test_full_consumption_deletes_record() {
        let (book, log, _tmp) = fixture();
        book.insert(&req(5, 10.0, 9.0, 5)).unwrap();

        let trades = match_once(&book, &log);

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].qty, 5);
        assert_eq!(trades[0].price, 9.5);
        assert!(book.pending().unwrap().is_empty());
    }

    #[test]
    fn test_partial_consumption_also_deletes_record() {
        let (book, log, _tmp) = fixture();
        book.insert(&req(10, 10.0, 8.0, 4)).unwrap();

        let trades = match_once(&book, &log);

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].qty, 4);
        assert_eq!(trades[0].price, 9.0);
        // The trade snapshots the pre-settlement quantities
        assert_eq!(trades[0].buyer_qty, 10);
        assert_eq!(trades[0].seller_qty, 4);
        // The seller leg hit zero, which removes the whole record; the
        // reduced buyer leg does not survive it.
        assert!(book.pending().unwrap().is_empty());
    }

    #[test]
    fn test_equal_prices_cross() {
        let (book, log, _tmp) = fixture();
        book.insert(&req(2, 9.0, 9.0, 2)).unwrap();

        let trades = match_once(&book, &log);
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].price, 9.0);
    }

    #[test]
    fn test_multiple_crossed_records_settle_in_id_order() {
        let (book, log, _tmp) = fixture();
        let a = book.insert(&req(5, 10.0, 9.0, 5)).unwrap();
        book.insert(&req(1, 5.0, 7.0, 1)).unwrap(); // open spread, untouched
        let c = book.insert(&req(3, 8.0, 6.0, 7)).unwrap();
        assert!(a < c);

        let trades = match_once(&book, &log);

        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].qty, 5);
        assert_eq!(trades[0].price, 9.5);
        assert_eq!(trades[1].qty, 3);
        assert_eq!(trades[1].price, 7.0);

        let rest = book.pending().unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].buyer_price, 5.0);
    }

    #[test]
    fn test_trade_log_is_cumulative_across_passes() {
        let (book, log, _tmp) = fixture();

        book.insert(&req(5, 10.0, 9.0, 5)).unwrap();
        match_once(&book, &log);
        book.insert(&req(3, 8.0, 6.0, 3)).unwrap();
        match_once(&book, &log);

        let all = log.all().unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].id < all[1].id);
    }

    #[test]
    fn test_pass_leaves_no_zero_quantity_rows() {
        let (book, log, _tmp) = fixture();
        for i in 0..10u64 {
            let qty = i + 1;
            book.insert(&req(qty, 10.0, 9.0, 11 - qty)).unwrap();
        }
        match_once(&book, &log);

        for row in book.pending().unwrap() {
            assert!(row.buyer_qty > 0);
            assert!(row.seller_qty > 0);
        }
    }

    #[test]
    fn test_repeat_pass_is_idempotent_on_settled_book() {
        let (book, log, _tmp) = fixture();
        book.insert(&req(5, 10.0, 9.0, 5)).unwrap();

        assert_eq!(match_once(&book, &log).len(), 1);
        assert!(match_once(&book, &log).is_empty());
        assert_eq!(log.all().unwrap().len(), 1);
    }
}
