use crate::{book::OrderBook, errors::BookError, store::Store, trade::TradeLog};
use std::{
    path::Path,
    sync::{Arc, Mutex},
};

/// Shared handles for the HTTP handlers.
///
/// Submission locks `book` and then `trade_log` (always that order) for the
/// whole insert + matching pass, which is the single-writer serialization
/// point. Reads take the same locks briefly and see a point-in-time snapshot.
#[derive(Clone)]
pub struct AppState {
    pub book: Arc<Mutex<OrderBook>>,
    pub trade_log: Arc<Mutex<TradeLog>>,
}

impl AppState {
    /// Open the store at `path` and wire both components to it. With `fresh`
    /// set, existing rows are dropped first (the ids restart too).
    pub fn new(path: impl AsRef<Path>, fresh: bool) -> Result<Self, BookError> {
        let store = Store::open(path)?;
        if fresh {
            store.wipe()?;
        }
        let store = Arc::new(store);
        Ok(Self {
            book: Arc::new(Mutex::new(OrderBook::new(store.clone()))),
            trade_log: Arc::new(Mutex::new(TradeLog::new(store))),
        })
    }
}
