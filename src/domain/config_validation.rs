//! Configuration validation.
//!
//! Reads typed settings through [`ConfigPort`] and rejects values a run cannot
//! use before any data is loaded.

use crate::domain::backtest::BacktestConfig;
use crate::domain::error::BarstepError;
use crate::domain::execution::ExecutionConfig;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

const BACKTEST: &str = "backtest";

pub(crate) fn invalid(section: &str, key: &str, reason: impl Into<String>) -> BarstepError {
    BarstepError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// A string setting that must be present and non-blank.
pub fn required_string(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<String, BarstepError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(BarstepError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
    }
}

/// Validate every `[backtest]` setting without building anything.
pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), BarstepError> {
    backtest_config(config)?;
    execution_config(config)?;
    date_range(config)?;
    Ok(())
}

pub fn backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, BarstepError> {
    let defaults = BacktestConfig::default();

    let initial_capital = config.get_double(BACKTEST, "initial_capital", defaults.initial_capital);
    if !(initial_capital > 0.0 && initial_capital.is_finite()) {
        return Err(invalid(BACKTEST, "initial_capital", "initial_capital must be positive"));
    }

    let trade_lag = config.get_int(BACKTEST, "trade_lag", defaults.trade_lag as i64);
    let trade_lag = usize::try_from(trade_lag)
        .map_err(|_| invalid(BACKTEST, "trade_lag", "trade_lag must be non-negative"))?;

    let periods_per_year =
        config.get_double(BACKTEST, "periods_per_year", defaults.periods_per_year);
    if periods_per_year <= 0.0 {
        return Err(invalid(BACKTEST, "periods_per_year", "periods_per_year must be positive"));
    }

    let risk_free_rate = config.get_double(BACKTEST, "risk_free_rate", defaults.risk_free_rate);
    if !(0.0..1.0).contains(&risk_free_rate) {
        return Err(invalid(BACKTEST, "risk_free_rate", "risk_free_rate must be between 0 and 1"));
    }

    Ok(BacktestConfig {
        initial_capital,
        trade_lag,
        periods_per_year,
        risk_free_rate,
    })
}

pub fn execution_config(config: &dyn ConfigPort) -> Result<ExecutionConfig, BarstepError> {
    let non_negative = |key: &str| -> Result<f64, BarstepError> {
        let value = config.get_double(BACKTEST, key, 0.0);
        if value < 0.0 {
            return Err(invalid(BACKTEST, key, format!("{} must be non-negative", key)));
        }
        Ok(value)
    };
    Ok(ExecutionConfig {
        commission_per_trade: non_negative("commission_per_trade")?,
        commission_pct: non_negative("commission_pct")?,
        slippage_pct: non_negative("slippage_pct")?,
    })
}

/// Optional `start_date` / `end_date` bounds on the data to load.
pub fn date_range(
    config: &dyn ConfigPort,
) -> Result<(Option<NaiveDate>, Option<NaiveDate>), BarstepError> {
    let start = parse_date(config.get_string(BACKTEST, "start_date").as_deref(), "start_date")?;
    let end = parse_date(config.get_string(BACKTEST, "end_date").as_deref(), "end_date")?;
    if let (Some(s), Some(e)) = (start, end) {
        if s >= e {
            return Err(invalid(BACKTEST, "start_date", "start_date must be before end_date"));
        }
    }
    Ok((start, end))
}

fn parse_date(value: Option<&str>, field: &str) -> Result<Option<NaiveDate>, BarstepError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| {
                invalid(
                    BACKTEST,
                    field,
                    format!("invalid {} format, expected YYYY-MM-DD", field),
                )
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    fn invalid_key(err: &BarstepError) -> &str {
        match err {
            BarstepError::ConfigInvalid { key, .. } => key,
            other => panic!("expected ConfigInvalid, got {other:?}"),
        }
    }

    #[test]
    fn valid_backtest_config_passes() {
        let config = make_config(
            r#"
[backtest]
initial_capital = 100000.0
trade_lag = 2
periods_per_year = 365
commission_per_trade = 10.0
commission_pct = 0.1
slippage_pct = 0.05
risk_free_rate = 0.05
start_date = 2020-01-01
end_date = 2024-12-31
"#,
        );
        assert!(validate_backtest_config(&config).is_ok());
        let bt = backtest_config(&config).unwrap();
        assert_eq!(bt.trade_lag, 2);
        assert!((bt.periods_per_year - 365.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_section_uses_defaults() {
        let config = make_config("[backtest]\n");
        assert_eq!(backtest_config(&config).unwrap(), BacktestConfig::default());
        assert_eq!(execution_config(&config).unwrap(), ExecutionConfig::default());
        assert_eq!(date_range(&config).unwrap(), (None, None));
    }

    #[test]
    fn initial_capital_must_be_positive() {
        let config = make_config("[backtest]\ninitial_capital = -100\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert_eq!(invalid_key(&err), "initial_capital");
    }

    #[test]
    fn initial_capital_zero_fails() {
        let config = make_config("[backtest]\ninitial_capital = 0\n");
        let err = backtest_config(&config).unwrap_err();
        assert_eq!(invalid_key(&err), "initial_capital");
    }

    #[test]
    fn negative_trade_lag_fails() {
        let config = make_config("[backtest]\ntrade_lag = -1\n");
        let err = backtest_config(&config).unwrap_err();
        assert_eq!(invalid_key(&err), "trade_lag");
    }

    #[test]
    fn zero_trade_lag_accepted() {
        let config = make_config("[backtest]\ntrade_lag = 0\n");
        assert_eq!(backtest_config(&config).unwrap().trade_lag, 0);
    }

    #[test]
    fn periods_per_year_must_be_positive() {
        let config = make_config("[backtest]\nperiods_per_year = 0\n");
        let err = backtest_config(&config).unwrap_err();
        assert_eq!(invalid_key(&err), "periods_per_year");
    }

    #[test]
    fn commission_pct_negative_fails() {
        let config = make_config("[backtest]\ncommission_pct = -0.1\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert_eq!(invalid_key(&err), "commission_pct");
    }

    #[test]
    fn slippage_negative_fails() {
        let config = make_config("[backtest]\nslippage_pct = -1\n");
        let err = execution_config(&config).unwrap_err();
        assert_eq!(invalid_key(&err), "slippage_pct");
    }

    #[test]
    fn risk_free_rate_out_of_range_fails() {
        let config = make_config("[backtest]\nrisk_free_rate = 1.5\n");
        let err = backtest_config(&config).unwrap_err();
        assert_eq!(invalid_key(&err), "risk_free_rate");
    }

    #[test]
    fn invalid_start_date_format_fails() {
        let config = make_config("[backtest]\nstart_date = 01/02/2020\n");
        let err = date_range(&config).unwrap_err();
        assert_eq!(invalid_key(&err), "start_date");
    }

    #[test]
    fn start_date_after_end_date_fails() {
        let config = make_config("[backtest]\nstart_date = 2024-01-01\nend_date = 2020-01-01\n");
        assert!(date_range(&config).is_err());
    }

    #[test]
    fn required_string_missing() {
        let config = make_config("[pair]\nleft =   \n");
        let err = required_string(&config, "pair", "left").unwrap_err();
        assert!(matches!(err, BarstepError::ConfigMissing { key, .. } if key == "left"));
    }
}
