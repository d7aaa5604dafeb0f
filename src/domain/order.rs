//! Orders emitted by rules and trades produced by the market simulator.

use chrono::NaiveDateTime;
use std::fmt;

use super::error::BarstepError;
use super::instrument::Instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKind {
    Market,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Open,
    Filled,
    /// Reached its execution step but produced no trade.
    Unfilled,
    /// Its execution step lies past the end of the time axis.
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReasonCode {
    EnterLong,
    EnterShort,
    ExitLong,
    ExitShort,
    Enter,
    Exit,
    Custom(String),
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReasonCode::EnterLong => write!(f, "ENTER_LONG"),
            ReasonCode::EnterShort => write!(f, "ENTER_SHORT"),
            ReasonCode::ExitLong => write!(f, "EXIT_LONG"),
            ReasonCode::ExitShort => write!(f, "EXIT_SHORT"),
            ReasonCode::Enter => write!(f, "ENTER"),
            ReasonCode::Exit => write!(f, "EXIT"),
            ReasonCode::Custom(code) => f.write_str(code),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    id: OrderId,
    instrument: Instrument,
    timestamp: NaiveDateTime,
    quantity: f64,
    kind: OrderKind,
    reason: ReasonCode,
    status: OrderStatus,
}

impl Order {
    /// A market order for `quantity` (signed: positive buys, negative sells).
    ///
    /// The id stays `OrderId(0)` until the strategy accepts the order.
    pub fn market(
        instrument: &Instrument,
        timestamp: NaiveDateTime,
        quantity: f64,
        reason: ReasonCode,
    ) -> Result<Self, BarstepError> {
        if !quantity.is_finite() || quantity == 0.0 {
            return Err(BarstepError::InvalidOrder {
                reason: format!(
                    "quantity for {} at {} must be finite and non-zero, got {}",
                    instrument.symbol(),
                    timestamp,
                    quantity
                ),
            });
        }
        Ok(Self {
            id: OrderId(0),
            instrument: instrument.clone(),
            timestamp,
            quantity,
            kind: OrderKind::Market,
            reason,
            status: OrderStatus::Open,
        })
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn quantity(&self) -> f64 {
        self.quantity
    }

    pub fn is_buy(&self) -> bool {
        self.quantity > 0.0
    }

    pub fn kind(&self) -> OrderKind {
        self.kind
    }

    pub fn reason(&self) -> &ReasonCode {
        &self.reason
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn is_filled(&self) -> bool {
        self.status == OrderStatus::Filled
    }

    /// Mark the order filled. A second fill is an invariant violation.
    pub fn fill(&mut self) -> Result<(), BarstepError> {
        match self.status {
            OrderStatus::Open => {
                self.status = OrderStatus::Filled;
                Ok(())
            }
            other => Err(BarstepError::InvariantViolation {
                reason: format!("order {} cannot be filled, status is {:?}", self.id, other),
            }),
        }
    }

    pub(crate) fn assign_id(&mut self, id: OrderId) {
        self.id = id;
    }

    pub(crate) fn set_status(&mut self, status: OrderStatus) {
        self.status = status;
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "order {} {} {} qty {} {} {:?}",
            self.id,
            self.instrument.symbol(),
            self.timestamp,
            self.quantity,
            self.reason,
            self.status
        )
    }
}

/// The realized result of a filled order. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    instrument: Instrument,
    order_id: OrderId,
    timestamp: NaiveDateTime,
    quantity: f64,
    price: f64,
    commission: f64,
    fee: f64,
}

impl Trade {
    /// A trade for the full quantity of `order`.
    pub fn new(
        order: &Order,
        timestamp: NaiveDateTime,
        price: f64,
        commission: f64,
        fee: f64,
    ) -> Self {
        Self {
            instrument: order.instrument.clone(),
            order_id: order.id,
            timestamp,
            quantity: order.quantity,
            price,
            commission,
            fee,
        }
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn quantity(&self) -> f64 {
        self.quantity
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn commission(&self) -> f64 {
        self.commission
    }

    pub fn fee(&self) -> f64 {
        self.fee
    }

    /// Signed cash impact: buying decreases cash.
    pub fn cash_delta(&self) -> f64 {
        -(self.quantity * self.price) - self.commission - self.fee
    }
}

impl fmt::Display for Trade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "trade {} {} qty {} @ {} comm {} fee {} (order {})",
            self.instrument.symbol(),
            self.timestamp,
            self.quantity,
            self.price,
            self.commission,
            self.fee,
            self.order_id
        )
    }
}
