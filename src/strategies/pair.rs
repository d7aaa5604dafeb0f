//! Pair trading on the rolling z-score of the price ratio of two symbols.
//!
//! Each leg is its own instrument group named after its symbol. The signal
//! maps the z-score to `{-2, -1, 0, 1, 2}` (strong/weak in either direction),
//! mirrored for the right leg. A strong value opens a position sized at
//! `risk_percent` of equity; a weak value against the open position closes it.

use std::collections::HashMap;

use crate::domain::account::is_flat;
use crate::domain::backtest::BacktestConfig;
use crate::domain::config_validation::{invalid, required_string};
use crate::domain::error::{ensure, BarstepError};
use crate::domain::execution::{BarMidpointSimulator, ExecutionConfig};
use crate::domain::indicator::rolling::rolling_zscore;
use crate::domain::indicator::IndicatorDef;
use crate::domain::instrument::{Instrument, InstrumentRegistry};
use crate::domain::ohlcv::AlignedBars;
use crate::domain::order::{Order, ReasonCode};
use crate::domain::rule::{PositionFilter, RuleContext, RuleDef};
use crate::domain::series::SignalValue;
use crate::domain::signal::SignalDef;
use crate::domain::strategy::Strategy;
use crate::domain::time_axis::TimeAxis;
use crate::ports::config_port::ConfigPort;

pub const SIGNAL: &str = "pair_signal";
const SECTION: &str = "pair";

#[derive(Debug, Clone, PartialEq)]
pub struct PairParams {
    pub left: String,
    pub right: String,
    pub window: usize,
    pub entry_threshold: f64,
    pub exit_threshold: f64,
    pub risk_percent: f64,
}

impl PairParams {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
            window: 130,
            entry_threshold: 1.0,
            exit_threshold: 0.5,
            risk_percent: 0.1,
        }
    }

    /// Read and validate the `[pair]` section.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, BarstepError> {
        let defaults = Self::new(
            required_string(config, SECTION, "left")?,
            required_string(config, SECTION, "right")?,
        );
        if defaults.left == defaults.right {
            return Err(invalid(SECTION, "right", "right must differ from left"));
        }

        let window = config.get_int(SECTION, "window", defaults.window as i64);
        let window = usize::try_from(window)
            .ok()
            .filter(|w| *w >= 2)
            .ok_or_else(|| invalid(SECTION, "window", "window must be at least 2"))?;

        let entry_threshold =
            config.get_double(SECTION, "entry_threshold", defaults.entry_threshold);
        let exit_threshold =
            config.get_double(SECTION, "exit_threshold", defaults.exit_threshold);
        if !(exit_threshold > 0.0 && exit_threshold < entry_threshold) {
            return Err(invalid(
                SECTION,
                "exit_threshold",
                "exit_threshold must be positive and below entry_threshold",
            ));
        }

        let risk_percent = config.get_double(SECTION, "risk_percent", defaults.risk_percent);
        if !(risk_percent > 0.0 && risk_percent <= 1.0) {
            return Err(invalid(SECTION, "risk_percent", "risk_percent must be in (0, 1]"));
        }

        Ok(Self {
            window,
            entry_threshold,
            exit_threshold,
            risk_percent,
            ..defaults
        })
    }

    /// Map a z-score to a signal value for the left leg.
    ///
    /// A z-score exactly at `±entry_threshold` maps to 0.
    pub fn classify(&self, z: f64) -> SignalValue {
        if z > self.entry_threshold {
            2
        } else if z < -self.entry_threshold {
            -2
        } else if z > self.exit_threshold && z < self.entry_threshold {
            1
        } else if z < -self.exit_threshold && z > -self.entry_threshold {
            -1
        } else {
            0
        }
    }
}

/// Context shared by every callback of a pair run.
#[derive(Debug, Clone)]
pub struct PairContext {
    pub params: PairParams,
    closes: HashMap<String, Vec<f64>>,
}

impl PairContext {
    pub fn close(&self, symbol: &str, index: usize) -> Result<f64, BarstepError> {
        self.closes
            .get(symbol)
            .and_then(|c| c.get(index).copied())
            .ok_or_else(|| BarstepError::UnknownInstrument(symbol.to_string()))
    }
}

fn price_lookup(
    instrument: &Instrument,
    _: &TimeAxis,
    index: usize,
    ctx: &PairContext,
) -> Result<f64, BarstepError> {
    ctx.close(instrument.symbol(), index)
}

fn entry_rule(ctx: &RuleContext<'_, PairContext>) -> Result<Vec<Order>, BarstepError> {
    ensure(is_flat(ctx.position()?), format!("{} is not flat at entry", ctx.group))?;
    let instrument = ctx.instrument(ctx.group.name())?;
    let close = ctx.indicators.get("c")?[ctx.index];
    let signal = ctx.signal_value() as f64;
    let qty = (ctx.equity()? * ctx.context.params.risk_percent / close * signal.signum()).round();
    if !qty.is_finite() || qty == 0.0 {
        tracing::debug!(group = %ctx.group, close, "entry skipped, no tradable quantity");
        return Ok(Vec::new());
    }
    let reason = if qty > 0.0 {
        ReasonCode::EnterLong
    } else {
        ReasonCode::EnterShort
    };
    Ok(vec![Order::market(instrument, ctx.timestamp(), qty, reason)?])
}

fn exit_rule(ctx: &RuleContext<'_, PairContext>) -> Result<Vec<Order>, BarstepError> {
    let position = ctx.position()?;
    ensure(!is_flat(position), format!("{} is flat at exit", ctx.group))?;
    let signal = ctx.signal_value();
    if !((position > 0.0 && signal == -1) || (position < 0.0 && signal == 1)) {
        return Ok(Vec::new());
    }
    let instrument = ctx.instrument(ctx.group.name())?;
    let reason = if position > 0.0 {
        ReasonCode::ExitLong
    } else {
        ReasonCode::ExitShort
    };
    Ok(vec![Order::market(instrument, ctx.timestamp(), -position, reason)?])
}

/// Assemble the pair strategy over two legs already aligned to `axis`.
pub fn build(
    params: PairParams,
    axis: TimeAxis,
    left: &AlignedBars,
    right: &AlignedBars,
    config: BacktestConfig,
    execution: ExecutionConfig,
) -> Result<Strategy<PairContext>, BarstepError> {
    let mut registry = InstrumentRegistry::new();
    let left_group = registry.group(&params.left);
    let right_group = registry.group(&params.right);
    registry.create_instrument(&params.left, &left_group)?;
    registry.create_instrument(&params.right, &right_group)?;

    let ratio: Vec<f64> = left
        .close
        .iter()
        .zip(&right.close)
        .map(|(l, r)| l / r)
        .collect();
    let window = params.window;
    let context = PairContext {
        closes: HashMap::from([
            (params.left.clone(), left.close.clone()),
            (params.right.clone(), right.close.clone()),
        ]),
        params,
    };

    let mut strategy = Strategy::new(axis, registry, price_lookup, config, context)?;
    for (group, bars) in [(&left_group, left), (&right_group, right)] {
        for (name, values) in bars.columns() {
            strategy.add_indicator(
                IndicatorDef::vector(name, values.to_vec()).groups(std::slice::from_ref(group)),
            )?;
        }
    }
    strategy.add_indicator(IndicatorDef::vector("ratio", ratio))?;
    strategy.add_indicator(
        IndicatorDef::computed("zscore", move |_, _, ind, _: &PairContext| {
            Ok(rolling_zscore(ind.get("ratio")?, window))
        })
        .depends_on(["ratio"]),
    )?;

    strategy.add_signal(
        SignalDef::new(SIGNAL, |group, _, ind, _, ctx: &PairContext| {
            let mirror = if group.name() == ctx.params.right { -1 } else { 1 };
            Ok(ind
                .get("zscore")?
                .iter()
                .map(|&z| mirror * ctx.params.classify(z))
                .collect())
        })
        .depends_on_indicators(["zscore"]),
    )?;

    strategy.add_rule(
        RuleDef::new("pair_entry", SIGNAL, entry_rule)
            .triggers([-2, 2])
            .position_filter(PositionFilter::Zero),
    )?;
    strategy.add_rule(
        RuleDef::new("pair_exit", SIGNAL, exit_rule)
            .triggers([-1, 1])
            .position_filter(PositionFilter::NonZero),
    )?;
    strategy.add_market_sim(BarMidpointSimulator::new(execution))?;
    Ok(strategy)
}
