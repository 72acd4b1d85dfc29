use crate::errors::BookError;

/// Names one side of a pending order's two quantity/price pairs.
///
/// Every pending order carries both a buy leg and a sell leg; matching
/// decrements each leg independently, so mutations are addressed per leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leg {
    Buyer,
    Seller,
}

/// A validated submission: the four fields a caller provides.
///
/// Quantities and prices must all be positive; [`OrderRequest::validate`] is
/// the gate the book applies before anything touches the store.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct OrderRequest {
    pub buyer_qty: u64,
    pub buyer_price: f64,
    pub seller_price: f64,
    pub seller_qty: u64,
}

impl OrderRequest {
    pub fn validate(&self) -> Result<(), BookError> {
        if self.buyer_qty == 0 || self.seller_qty == 0 {
            return Err(BookError::InvalidInput("quantity must be > 0".into()));
        }
        // `> 0.0` also rejects NaN; infinities are no use as prices either
        if !(self.buyer_price > 0.0 && self.buyer_price.is_finite())
            || !(self.seller_price > 0.0 && self.seller_price.is_finite())
        {
            return Err(BookError::InvalidInput("price must be > 0".into()));
        }
        Ok(())
    }
}

/// A resting, unfilled (or partially filled) order.
///
/// One record carries both legs, so whether it can settle is a property of
/// the record alone: the buy leg crossing the sell leg. Both quantities stay
/// strictly positive for as long as the record exists; a leg decremented to
/// zero removes the whole record.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, bincode::Encode, bincode::Decode)]
pub struct PendingOrder {
    pub id: u64,
    pub buyer_qty: u64,
    pub buyer_price: f64,
    pub seller_price: f64,
    pub seller_qty: u64,
}

impl PendingOrder {
    /// Whether the buy leg meets or exceeds the sell leg's asking price.
    pub fn is_crossed(&self) -> bool {
        self.buyer_price >= self.seller_price
    }

    /// The quantity a settlement of this record moves.
    pub fn fill_qty(&self) -> u64 {
        self.buyer_qty.min(self.seller_qty)
    }

    /// Midpoint of the two leg prices.
    pub fn clearing_price(&self) -> f64 {
        (self.buyer_price + self.seller_price) / 2.0
    }

    pub fn leg_qty(&self, leg: Leg) -> u64 {
        match leg {
            Leg::Buyer => self.buyer_qty,
            Leg::Seller => self.seller_qty,
        }
    }

    pub fn set_leg_qty(&mut self, leg: Leg, qty: u64) {
        match leg {
            Leg::Buyer => self.buyer_qty = qty,
            Leg::Seller => self.seller_qty = qty,
        }
    }
}
