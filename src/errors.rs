use thiserror::Error;

use crate::store::StoreError;

/// Errors surfaced by the order book and matching paths.
///
/// `InvalidInput` is rejected before anything is stored. `NotFound` is a
/// hard error for direct callers, but the matching pass treats it as the
/// benign "row already gone" race and moves on. `Storage` abandons the
/// affected row only.
#[derive(Error, Debug)]
pub enum BookError {
    #[error("invalid order: {0}")]
    InvalidInput(String),
    #[error("order {0} not found")]
    NotFound(u64),
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}
