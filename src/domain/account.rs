//! Account ledger: positions, cash and equity per instrument group.
//!
//! Trades are the only way to change positions or cash, and they must arrive
//! in non-decreasing timestamp order. Every query is point-in-time and may not
//! look past the simulation clock.

use chrono::NaiveDateTime;
use std::collections::{BTreeMap, HashMap};

use super::error::BarstepError;
use super::instrument::{Instrument, InstrumentGroup};
use super::order::Trade;

/// Quantities closer to zero than this count as flat.
pub const FLAT_EPSILON: f64 = 1e-9;

pub fn is_flat(quantity: f64) -> bool {
    quantity.abs() < FLAT_EPSILON
}

#[derive(Debug, Clone, PartialEq)]
pub struct EquityPoint {
    pub timestamp: NaiveDateTime,
    pub equity: f64,
}

/// Account state marked at one step of the time axis.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountSnapshot {
    pub index: usize,
    pub timestamp: NaiveDateTime,
    pub cash: f64,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq)]
struct PositionPoint {
    timestamp: NaiveDateTime,
    position: f64,
    cash: f64,
}

#[derive(Debug, Clone, Default)]
struct GroupBook {
    points: Vec<PositionPoint>,
    holdings: BTreeMap<String, (Instrument, f64)>,
}

impl GroupBook {
    fn position(&self) -> f64 {
        self.points.last().map(|p| p.position).unwrap_or(0.0)
    }

    fn cash(&self) -> f64 {
        self.points.last().map(|p| p.cash).unwrap_or(0.0)
    }

    fn at(&self, timestamp: NaiveDateTime) -> Option<&PositionPoint> {
        let idx = self.points.partition_point(|p| p.timestamp <= timestamp);
        idx.checked_sub(1).map(|i| &self.points[i])
    }
}

/// Saved account state to roll an aborted step back to.
#[derive(Debug, Clone)]
pub struct AccountCheckpoint {
    trade_count: usize,
    books: BTreeMap<String, (usize, BTreeMap<String, (Instrument, f64)>)>,
    marks: HashMap<String, f64>,
    snapshot_count: usize,
    last_snapshot: Option<AccountSnapshot>,
    clock: Option<(usize, NaiveDateTime)>,
}

#[derive(Debug, Clone)]
pub struct Account {
    initial_capital: f64,
    books: BTreeMap<String, GroupBook>,
    trades: Vec<Trade>,
    marks: HashMap<String, f64>,
    snapshots: Vec<AccountSnapshot>,
    clock: Option<(usize, NaiveDateTime)>,
}

impl Account {
    pub fn new(initial_capital: f64, groups: &[InstrumentGroup]) -> Self {
        Self {
            initial_capital,
            books: groups
                .iter()
                .map(|g| (g.name().to_string(), GroupBook::default()))
                .collect(),
            trades: Vec::new(),
            marks: HashMap::new(),
            snapshots: Vec::new(),
            clock: None,
        }
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    /// Current simulation time, if the run has started.
    pub fn clock(&self) -> Option<NaiveDateTime> {
        self.clock.map(|(_, ts)| ts)
    }

    /// Move the simulation clock to step `index`. Time never goes backwards.
    pub fn advance_to(&mut self, index: usize, timestamp: NaiveDateTime) -> Result<(), BarstepError> {
        if let Some((_, current)) = self.clock {
            if timestamp < current {
                return Err(BarstepError::InvariantViolation {
                    reason: format!("clock moved backwards from {} to {}", current, timestamp),
                });
            }
        }
        self.clock = Some((index, timestamp));
        Ok(())
    }

    /// Apply a trade: position += quantity, cash += -(quantity * price) - commission - fee.
    pub fn apply(&mut self, trade: Trade) -> Result<(), BarstepError> {
        let group = trade.instrument().group().name().to_string();
        if let Some(last) = self.trades.last() {
            if trade.timestamp() < last.timestamp() {
                return Err(BarstepError::InvariantViolation {
                    reason: format!(
                        "trade at {} applied after trade at {}",
                        trade.timestamp(),
                        last.timestamp()
                    ),
                });
            }
        }
        if let Some((_, now)) = self.clock {
            if trade.timestamp() > now {
                return Err(BarstepError::LookAhead {
                    requested: trade.timestamp(),
                    current: now,
                });
            }
        }
        if !trade.price().is_finite() {
            return Err(BarstepError::InvariantViolation {
                reason: format!("trade price is not finite: {}", trade),
            });
        }
        let book = self
            .books
            .get_mut(&group)
            .ok_or_else(|| BarstepError::UnknownGroup(group.clone()))?;

        let point = PositionPoint {
            timestamp: trade.timestamp(),
            position: book.position() + trade.quantity(),
            cash: book.cash() + trade.cash_delta(),
        };
        book.points.push(point);

        let symbol = trade.instrument().symbol().to_string();
        let holding = book
            .holdings
            .entry(symbol.clone())
            .or_insert_with(|| (trade.instrument().clone(), 0.0));
        holding.1 += trade.quantity();

        self.marks.insert(symbol, trade.price());
        tracing::debug!(%trade, "applied trade");
        self.trades.push(trade);
        Ok(())
    }

    fn check_clock(&self, timestamp: NaiveDateTime) -> Result<(), BarstepError> {
        match self.clock {
            Some((_, now)) if timestamp > now => Err(BarstepError::LookAhead {
                requested: timestamp,
                current: now,
            }),
            _ => Ok(()),
        }
    }

    fn book(&self, group: &InstrumentGroup) -> Result<&GroupBook, BarstepError> {
        self.books
            .get(group.name())
            .ok_or_else(|| BarstepError::UnknownGroup(group.name().to_string()))
    }

    /// Net position of `group` as of `timestamp`, summed over its instruments.
    pub fn position(&self, group: &InstrumentGroup, timestamp: NaiveDateTime) -> Result<f64, BarstepError> {
        self.check_clock(timestamp)?;
        Ok(self
            .book(group)?
            .at(timestamp)
            .map(|p| p.position)
            .unwrap_or(0.0))
    }

    /// Position in a single instrument as of `timestamp`.
    pub fn instrument_position(
        &self,
        instrument: &Instrument,
        timestamp: NaiveDateTime,
    ) -> Result<f64, BarstepError> {
        self.check_clock(timestamp)?;
        self.book(instrument.group())?;
        Ok(self
            .trades
            .iter()
            .take_while(|t| t.timestamp() <= timestamp)
            .filter(|t| t.instrument() == instrument)
            .map(|t| t.quantity())
            .sum())
    }

    /// Cash contribution of `group` as of `timestamp` (zero before its first trade).
    pub fn group_cash(&self, group: &InstrumentGroup, timestamp: NaiveDateTime) -> Result<f64, BarstepError> {
        self.check_clock(timestamp)?;
        Ok(self.book(group)?.at(timestamp).map(|p| p.cash).unwrap_or(0.0))
    }

    /// Total cash as of `timestamp`: initial capital plus every group's contribution.
    pub fn cash(&self, timestamp: NaiveDateTime) -> Result<f64, BarstepError> {
        self.check_clock(timestamp)?;
        Ok(self.initial_capital
            + self
                .books
                .values()
                .map(|b| b.at(timestamp).map(|p| p.cash).unwrap_or(0.0))
                .sum::<f64>())
    }

    /// Equity as last marked at or before `timestamp`; initial capital before the first mark.
    pub fn equity(&self, timestamp: NaiveDateTime) -> Result<f64, BarstepError> {
        self.check_clock(timestamp)?;
        let idx = self.snapshots.partition_point(|s| s.timestamp <= timestamp);
        Ok(idx
            .checked_sub(1)
            .map(|i| self.snapshots[i].equity)
            .unwrap_or(self.initial_capital))
    }

    /// Mark every open position and record equity for step `index`.
    ///
    /// `price` is asked for each instrument with a non-flat position. A
    /// non-finite price falls back to the instrument's last finite mark.
    /// Marking the same step twice replaces the earlier snapshot.
    pub fn mark_to_market<F>(
        &mut self,
        index: usize,
        timestamp: NaiveDateTime,
        mut price: F,
    ) -> Result<f64, BarstepError>
    where
        F: FnMut(&Instrument) -> Result<f64, BarstepError>,
    {
        let mut cash = self.initial_capital;
        let mut market_value = 0.0;
        for book in self.books.values() {
            cash += book.cash();
            for (symbol, (instrument, quantity)) in &book.holdings {
                if is_flat(*quantity) {
                    continue;
                }
                let quoted = price(instrument)?;
                let mark = if quoted.is_finite() {
                    self.marks.insert(symbol.clone(), quoted);
                    quoted
                } else {
                    let last = self.marks.get(symbol).copied().ok_or_else(|| {
                        BarstepError::Data {
                            reason: format!("no finite price for {} at {}", symbol, timestamp),
                        }
                    })?;
                    tracing::debug!(symbol = %symbol, %timestamp, last, "price missing, using last mark");
                    last
                };
                market_value += quantity * mark;
            }
        }

        let snapshot = AccountSnapshot {
            index,
            timestamp,
            cash,
            equity: cash + market_value,
        };
        let equity = snapshot.equity;
        match self.snapshots.last_mut() {
            Some(last) if last.index == index => *last = snapshot,
            _ => self.snapshots.push(snapshot),
        }
        Ok(equity)
    }

    pub fn snapshots(&self) -> &[AccountSnapshot] {
        &self.snapshots
    }

    /// Equity at every marked step, aligned with the time axis.
    pub fn equity_curve(&self) -> Vec<EquityPoint> {
        self.snapshots
            .iter()
            .map(|s| EquityPoint {
                timestamp: s.timestamp,
                equity: s.equity,
            })
            .collect()
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn trades_for<'a>(&'a self, group: &'a InstrumentGroup) -> impl Iterator<Item = &'a Trade> + 'a {
        self.trades
            .iter()
            .filter(move |t| t.instrument().group() == group)
    }

    /// Current non-flat holdings per instrument.
    pub fn current_positions(&self) -> Vec<(&Instrument, f64)> {
        self.books
            .values()
            .flat_map(|b| b.holdings.values())
            .filter(|(_, q)| !is_flat(*q))
            .map(|(i, q)| (i, *q))
            .collect()
    }

    /// Last finite mark for `symbol` (trade price or marked price).
    pub fn last_mark(&self, symbol: &str) -> Option<f64> {
        self.marks.get(symbol).copied()
    }

    pub fn checkpoint(&self) -> AccountCheckpoint {
        AccountCheckpoint {
            trade_count: self.trades.len(),
            books: self
                .books
                .iter()
                .map(|(name, b)| (name.clone(), (b.points.len(), b.holdings.clone())))
                .collect(),
            marks: self.marks.clone(),
            snapshot_count: self.snapshots.len(),
            last_snapshot: self.snapshots.last().cloned(),
            clock: self.clock,
        }
    }

    /// Roll back everything applied since `checkpoint` was taken.
    pub fn restore(&mut self, checkpoint: AccountCheckpoint) {
        self.trades.truncate(checkpoint.trade_count);
        for (name, (len, holdings)) in checkpoint.books {
            if let Some(book) = self.books.get_mut(&name) {
                book.points.truncate(len);
                book.holdings = holdings;
            }
        }
        self.marks = checkpoint.marks;
        self.snapshots.truncate(checkpoint.snapshot_count);
        if let (Some(last), Some(saved)) = (self.snapshots.last_mut(), checkpoint.last_snapshot) {
            *last = saved;
        }
        self.clock = checkpoint.clock;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::instrument::InstrumentRegistry;
    use crate::domain::order::{Order, OrderId, ReasonCode};
    use chrono::NaiveDate;

    fn ts(minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2018, 1, 5)
            .unwrap()
            .and_hms_opt(8, minute, 0)
            .unwrap()
    }

    struct Fixture {
        groups: Vec<InstrumentGroup>,
        aapl: Instrument,
        ibm: Instrument,
    }

    fn fixture() -> Fixture {
        let mut registry = InstrumentRegistry::new();
        let a = registry.group("AAPL");
        let i = registry.group("IBM");
        let aapl = registry.create_instrument("AAPL", &a).unwrap();
        let ibm = registry.create_instrument("IBM", &i).unwrap();
        Fixture {
            groups: vec![a, i],
            aapl,
            ibm,
        }
    }

    fn trade(inst: &Instrument, minute: u32, qty: f64, price: f64) -> Trade {
        let mut order = Order::market(inst, ts(minute), qty, ReasonCode::Enter).unwrap();
        order.assign_id(OrderId(1));
        Trade::new(&order, ts(minute), price, 0.0, 0.0)
    }

    #[test]
    fn starts_at_initial_capital() {
        let f = fixture();
        let account = Account::new(1_000_000.0, &f.groups);
        assert!((account.equity(ts(0)).unwrap() - 1_000_000.0).abs() < f64::EPSILON);
        assert_eq!(account.position(&f.groups[0], ts(0)).unwrap(), 0.0);
    }

    #[test]
    fn apply_updates_position_and_cash() {
        let f = fixture();
        let mut account = Account::new(10_000.0, &f.groups);
        account.advance_to(1, ts(1)).unwrap();
        account.apply(trade(&f.aapl, 1, 10.0, 50.0)).unwrap();
        assert_eq!(account.position(&f.groups[0], ts(1)).unwrap(), 10.0);
        assert_eq!(account.position(&f.groups[1], ts(1)).unwrap(), 0.0);
        assert!((account.cash(ts(1)).unwrap() - 9_500.0).abs() < 1e-9);
        assert!((account.group_cash(&f.groups[0], ts(1)).unwrap() + 500.0).abs() < 1e-9);
    }

    #[test]
    fn position_is_point_in_time() {
        let f = fixture();
        let mut account = Account::new(10_000.0, &f.groups);
        account.advance_to(3, ts(3)).unwrap();
        account.apply(trade(&f.aapl, 1, 10.0, 50.0)).unwrap();
        account.apply(trade(&f.aapl, 3, -4.0, 55.0)).unwrap();
        assert_eq!(account.position(&f.groups[0], ts(0)).unwrap(), 0.0);
        assert_eq!(account.position(&f.groups[0], ts(2)).unwrap(), 10.0);
        assert_eq!(account.position(&f.groups[0], ts(3)).unwrap(), 6.0);
        assert_eq!(account.instrument_position(&f.aapl, ts(3)).unwrap(), 6.0);
    }

    #[test]
    fn query_ahead_of_clock_fails() {
        let f = fixture();
        let mut account = Account::new(10_000.0, &f.groups);
        account.advance_to(1, ts(1)).unwrap();
        assert!(matches!(
            account.position(&f.groups[0], ts(2)),
            Err(BarstepError::LookAhead { .. })
        ));
        assert!(account.equity(ts(2)).is_err());
    }

    #[test]
    fn out_of_order_trade_rejected() {
        let f = fixture();
        let mut account = Account::new(10_000.0, &f.groups);
        account.advance_to(2, ts(2)).unwrap();
        account.apply(trade(&f.aapl, 2, 1.0, 50.0)).unwrap();
        let err = account.apply(trade(&f.ibm, 1, 1.0, 50.0)).unwrap_err();
        assert!(matches!(err, BarstepError::InvariantViolation { .. }));
    }

    #[test]
    fn future_trade_rejected() {
        let f = fixture();
        let mut account = Account::new(10_000.0, &f.groups);
        account.advance_to(1, ts(1)).unwrap();
        let err = account.apply(trade(&f.aapl, 2, 1.0, 50.0)).unwrap_err();
        assert!(matches!(err, BarstepError::LookAhead { .. }));
    }

    #[test]
    fn unknown_group_rejected() {
        let f = fixture();
        let mut account = Account::new(10_000.0, &f.groups[..1]);
        account.advance_to(1, ts(1)).unwrap();
        let err = account.apply(trade(&f.ibm, 1, 1.0, 50.0)).unwrap_err();
        assert!(matches!(err, BarstepError::UnknownGroup(name) if name == "IBM"));
    }

    #[test]
    fn equity_is_cash_plus_marked_positions() {
        let f = fixture();
        let mut account = Account::new(10_000.0, &f.groups);
        account.advance_to(1, ts(1)).unwrap();
        account.apply(trade(&f.aapl, 1, 10.0, 50.0)).unwrap();
        account.apply(trade(&f.ibm, 1, -5.0, 100.0)).unwrap();
        let equity = account
            .mark_to_market(1, ts(1), |inst| {
                Ok(if inst.symbol() == "AAPL" { 60.0 } else { 90.0 })
            })
            .unwrap();
        // cash 10_000 - 500 + 500 = 10_000; 10 * 60 - 5 * 90 = 150
        assert!((equity - 10_150.0).abs() < 1e-9);
        let cash = account.cash(ts(1)).unwrap();
        assert!((account.equity(ts(1)).unwrap() - (cash + 10.0 * 60.0 - 5.0 * 90.0)).abs() < 1e-9);
    }

    #[test]
    fn missing_price_uses_last_mark() {
        let f = fixture();
        let mut account = Account::new(10_000.0, &f.groups);
        account.advance_to(1, ts(1)).unwrap();
        account.apply(trade(&f.aapl, 1, 10.0, 50.0)).unwrap();
        account.mark_to_market(1, ts(1), |_| Ok(55.0)).unwrap();
        account.advance_to(2, ts(2)).unwrap();
        let equity = account.mark_to_market(2, ts(2), |_| Ok(f64::NAN)).unwrap();
        assert!((equity - (9_500.0 + 550.0)).abs() < 1e-9);
        assert_eq!(account.last_mark("AAPL"), Some(55.0));
    }

    #[test]
    fn price_errors_propagate() {
        let f = fixture();
        let mut account = Account::new(10_000.0, &f.groups);
        account.advance_to(1, ts(1)).unwrap();
        account.apply(trade(&f.aapl, 1, 10.0, 50.0)).unwrap();
        let err = account
            .mark_to_market(1, ts(1), |inst| {
                Err(BarstepError::UnknownInstrument(inst.symbol().to_string()))
            })
            .unwrap_err();
        assert!(matches!(err, BarstepError::UnknownInstrument(_)));
    }

    #[test]
    fn flat_positions_are_not_priced() {
        let f = fixture();
        let mut account = Account::new(10_000.0, &f.groups);
        account.advance_to(1, ts(1)).unwrap();
        account.apply(trade(&f.aapl, 1, 10.0, 50.0)).unwrap();
        account.apply(trade(&f.aapl, 1, -10.0, 52.0)).unwrap();
        let equity = account
            .mark_to_market(1, ts(1), |inst| {
                Err(BarstepError::UnknownInstrument(inst.symbol().to_string()))
            })
            .unwrap();
        assert!((equity - 10_020.0).abs() < 1e-9);
        assert!(account.current_positions().is_empty());
    }

    #[test]
    fn remarking_a_step_replaces_snapshot() {
        let f = fixture();
        let mut account = Account::new(10_000.0, &f.groups);
        account.advance_to(0, ts(0)).unwrap();
        account.mark_to_market(0, ts(0), |_| Ok(1.0)).unwrap();
        account.mark_to_market(0, ts(0), |_| Ok(1.0)).unwrap();
        assert_eq!(account.snapshots().len(), 1);
        assert_eq!(account.equity_curve().len(), 1);
    }

    #[test]
    fn restore_rolls_back_step() {
        let f = fixture();
        let mut account = Account::new(10_000.0, &f.groups);
        account.advance_to(0, ts(0)).unwrap();
        account.apply(trade(&f.aapl, 0, 10.0, 50.0)).unwrap();
        account.mark_to_market(0, ts(0), |_| Ok(50.0)).unwrap();

        let checkpoint = account.checkpoint();
        account.advance_to(1, ts(1)).unwrap();
        account.apply(trade(&f.aapl, 1, 5.0, 51.0)).unwrap();
        account.mark_to_market(1, ts(1), |_| Ok(51.0)).unwrap();
        account.restore(checkpoint);

        assert_eq!(account.trades().len(), 1);
        assert_eq!(account.snapshots().len(), 1);
        assert_eq!(account.clock(), Some(ts(0)));
        assert_eq!(account.position(&f.groups[0], ts(0)).unwrap(), 10.0);
        assert_eq!(account.current_positions()[0].1, 10.0);
        assert_eq!(account.last_mark("AAPL"), Some(50.0));
    }

    #[test]
    fn trades_for_group() {
        let f = fixture();
        let mut account = Account::new(10_000.0, &f.groups);
        account.advance_to(1, ts(1)).unwrap();
        account.apply(trade(&f.aapl, 1, 1.0, 50.0)).unwrap();
        account.apply(trade(&f.ibm, 1, 2.0, 50.0)).unwrap();
        assert_eq!(account.trades_for(&f.groups[1]).count(), 1);
    }
}
