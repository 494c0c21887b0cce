//! Per-address numeric time series and the scalar features computed over them.
//!
//! Any statistics library can be plugged in through [`SeriesFeature`]; the
//! calculators in [`Calculator`] cover the features the scorer ships with.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Median, Statistics};
use sybil_scorer_models::Transaction;

use crate::error::{AnalysisError, AnalysisResult};

/// Named numeric parameters passed to a feature calculator.
pub type FeatureParams = BTreeMap<String, f64>;

/// Parameter every time-relative calculator reads; kept out of column names
/// so reruns at different times produce the same columns.
pub const CURRENT_TIME_PARAM: &str = "current_time";

const WEI_PER_ETH: u64 = 1_000_000_000_000_000_000;

/// Numeric transaction field a series is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesKind {
    /// Transferred value in ETH.
    Value,
    /// Unix seconds.
    BlockTimestamp,
    GasUsed,
    GasLimit,
    TxFee,
}

impl SeriesKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesKind::Value => "value",
            SeriesKind::BlockTimestamp => "block_timestamp",
            SeriesKind::GasUsed => "gas_used",
            SeriesKind::GasLimit => "gas_limit",
            SeriesKind::TxFee => "tx_fee",
        }
    }

    /// The field's value for one transaction, if present.
    pub fn extract(&self, tx: &Transaction) -> Option<f64> {
        match self {
            SeriesKind::Value => tx
                .value
                .and_then(|wei| wei.checked_div(Decimal::from(WEI_PER_ETH)))
                .and_then(|eth| eth.to_f64()),
            SeriesKind::BlockTimestamp => Some(tx.timestamp.timestamp() as f64),
            SeriesKind::GasUsed => tx.gas_used.map(|g| g as f64),
            SeriesKind::GasLimit => tx.gas_limit.map(|g| g as f64),
            SeriesKind::TxFee => tx.tx_fee.and_then(|fee| fee.to_f64()),
        }
    }
}

impl fmt::Display for SeriesKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scalar feature over a numeric series.
///
/// Implementations return `None` for input they cannot summarise (an empty
/// series, a missing parameter) instead of failing.
pub trait SeriesFeature: Send + Sync {
    fn name(&self) -> &str;

    /// Parameters that must be present for `compute` to produce a value.
    fn required_params(&self) -> &'static [&'static str] {
        &[]
    }

    fn compute(&self, series: &[f64], params: &FeatureParams) -> Option<f64>;
}

/// Built-in feature calculators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Calculator {
    TimeSinceFirst,
    TimeSinceLast,
    RatioTxTimeSinceTime,
    RatioTxTimeSinceLastTx,
    RatioAboveMean,
    RatioAbove,
    SumValues,
    Mean,
    Median,
    Minimum,
    Maximum,
    StandardDeviation,
}

impl Calculator {
    pub const ALL: [Calculator; 12] = [
        Calculator::TimeSinceFirst,
        Calculator::TimeSinceLast,
        Calculator::RatioTxTimeSinceTime,
        Calculator::RatioTxTimeSinceLastTx,
        Calculator::RatioAboveMean,
        Calculator::RatioAbove,
        Calculator::SumValues,
        Calculator::Mean,
        Calculator::Median,
        Calculator::Minimum,
        Calculator::Maximum,
        Calculator::StandardDeviation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Calculator::TimeSinceFirst => "time_since_first",
            Calculator::TimeSinceLast => "time_since_last",
            Calculator::RatioTxTimeSinceTime => "ratio_tx_time_since_time",
            Calculator::RatioTxTimeSinceLastTx => "ratio_tx_time_since_last_tx",
            Calculator::RatioAboveMean => "ratio_above_mean",
            Calculator::RatioAbove => "ratio_above",
            Calculator::SumValues => "sum_values",
            Calculator::Mean => "mean",
            Calculator::Median => "median",
            Calculator::Minimum => "minimum",
            Calculator::Maximum => "maximum",
            Calculator::StandardDeviation => "standard_deviation",
        }
    }
}

impl FromStr for Calculator {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Calculator::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| AnalysisError::UnknownFeature(s.to_string()))
    }
}

impl SeriesFeature for Calculator {
    fn name(&self) -> &str {
        self.as_str()
    }

    fn required_params(&self) -> &'static [&'static str] {
        match self {
            Calculator::TimeSinceFirst | Calculator::TimeSinceLast => &[CURRENT_TIME_PARAM],
            Calculator::RatioTxTimeSinceTime => &[CURRENT_TIME_PARAM, "time"],
            Calculator::RatioTxTimeSinceLastTx => &["time"],
            Calculator::RatioAbove => &["v"],
            _ => &[],
        }
    }

    fn compute(&self, series: &[f64], params: &FeatureParams) -> Option<f64> {
        if series.is_empty() {
            return None;
        }
        let param = |name: &str| params.get(name).copied();

        match self {
            Calculator::TimeSinceFirst => Some(param(CURRENT_TIME_PARAM)? - minimum(series)),
            Calculator::TimeSinceLast => Some(param(CURRENT_TIME_PARAM)? - maximum(series)),
            Calculator::RatioTxTimeSinceTime => {
                let since = param(CURRENT_TIME_PARAM)? - param("time")?;
                Some(ratio_at_least(series, since))
            }
            Calculator::RatioTxTimeSinceLastTx => {
                let since = maximum(series) - param("time")?;
                Some(ratio_at_least(series, since))
            }
            Calculator::RatioAboveMean => Some(ratio_at_least(series, series.iter().mean())),
            Calculator::RatioAbove => Some(ratio_at_least(series, param("v")?)),
            Calculator::SumValues => Some(series.iter().sum()),
            Calculator::Mean => Some(series.iter().mean()),
            Calculator::Median => Some(Data::new(series.to_vec()).median()),
            Calculator::Minimum => Some(minimum(series)),
            Calculator::Maximum => Some(maximum(series)),
            Calculator::StandardDeviation => Some(series.iter().population_std_dev()),
        }
    }
}

fn minimum(series: &[f64]) -> f64 {
    Statistics::min(series.iter())
}

fn maximum(series: &[f64]) -> f64 {
    Statistics::max(series.iter())
}

/// Share of values greater than or equal to `bound`.
fn ratio_at_least(series: &[f64], bound: f64) -> f64 {
    series.iter().filter(|x| **x >= bound).count() as f64 / series.len() as f64
}

/// One requested feature column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesFeatureSpec {
    pub series: SeriesKind,
    pub calculator: String,
    #[serde(default)]
    pub params: FeatureParams,
}

impl SeriesFeatureSpec {
    pub fn new(series: SeriesKind, calculator: Calculator) -> Self {
        Self {
            series,
            calculator: calculator.as_str().to_string(),
            params: FeatureParams::new(),
        }
    }

    pub fn with_param(mut self, name: &str, value: f64) -> Self {
        self.params.insert(name.to_string(), value);
        self
    }

    /// The built-in calculator named by `calculator`.
    pub fn calculator(&self) -> AnalysisResult<Calculator> {
        self.calculator.parse()
    }

    /// Check the calculator exists and its required parameters are set.
    pub fn validate(&self) -> AnalysisResult<()> {
        let calculator = self.calculator()?;
        for name in calculator.required_params() {
            if !self.params.contains_key(*name) {
                return Err(AnalysisError::InvalidConfig(format!(
                    "feature {} requires parameter {}",
                    self.column_name(),
                    name
                )));
            }
        }
        Ok(())
    }

    /// `<series>__<calculator>[__<param>_<value>...]`, params in name order.
    pub fn column_name(&self) -> String {
        let mut name = format!("{}__{}", self.series.as_str(), self.calculator);
        for (param, value) in &self.params {
            if param == CURRENT_TIME_PARAM {
                continue;
            }
            name.push_str(&format!("__{}_{}", param, value));
        }
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const DAY: f64 = 86_400.0;

    fn params(pairs: &[(&str, f64)]) -> FeatureParams {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_value_series_is_in_eth() {
        let tx = Transaction::new("0x1", Utc.timestamp_opt(1_700_000_000, 0).unwrap(), None, None)
            .with_value(Decimal::from(2_500_000_000_000_000_000u64))
            .with_gas(21_000, 30_000);
        assert_eq!(SeriesKind::Value.extract(&tx), Some(2.5));
        assert_eq!(SeriesKind::BlockTimestamp.extract(&tx), Some(1_700_000_000.0));
        assert_eq!(SeriesKind::GasUsed.extract(&tx), Some(21_000.0));
        assert_eq!(SeriesKind::TxFee.extract(&tx), None);

        let with_fee = tx.with_fee(Decimal::new(42, 5));
        let fee = SeriesKind::TxFee.extract(&with_fee).unwrap();
        assert!((fee - 0.00042).abs() < 1e-12);
    }

    #[test]
    fn test_time_relative_features() {
        let now = 10.0 * DAY;
        let times = [DAY, 8.0 * DAY, 9.5 * DAY];
        let p = params(&[(CURRENT_TIME_PARAM, now), ("time", DAY)]);

        assert_eq!(Calculator::TimeSinceFirst.compute(&times, &p), Some(9.0 * DAY));
        assert_eq!(Calculator::TimeSinceLast.compute(&times, &p), Some(0.5 * DAY));
        assert_eq!(Calculator::RatioTxTimeSinceTime.compute(&times, &p), Some(1.0 / 3.0));
        assert_eq!(Calculator::RatioTxTimeSinceLastTx.compute(&times, &p), Some(1.0 / 3.0));
    }

    #[test]
    fn test_summary_statistics() {
        let values = [1.0, 2.0, 3.0, 6.0];
        let p = FeatureParams::new();
        let close = |calculator: Calculator, expected: f64| {
            let got = calculator.compute(&values, &p).unwrap();
            assert!((got - expected).abs() < 1e-9, "{}: {got}", calculator.as_str());
        };
        close(Calculator::Mean, 3.0);
        close(Calculator::Median, 2.5);
        let odd = Calculator::Median.compute(&[5.0, 1.0, 3.0], &p).unwrap();
        assert!((odd - 3.0).abs() < 1e-9);
        assert_eq!(Calculator::SumValues.compute(&values, &p), Some(12.0));
        assert_eq!(Calculator::Minimum.compute(&values, &p), Some(1.0));
        assert_eq!(Calculator::Maximum.compute(&values, &p), Some(6.0));
        assert_eq!(Calculator::RatioAboveMean.compute(&values, &p), Some(0.5));
        assert_eq!(
            Calculator::RatioAbove.compute(&values, &params(&[("v", 2.0)])),
            Some(0.75)
        );
        // population deviation, not the sample estimate
        let std = Calculator::StandardDeviation.compute(&values, &p).unwrap();
        assert!((std - 1.870_828_693).abs() < 1e-6);
        assert_eq!(Calculator::StandardDeviation.compute(&[4.0], &p), Some(0.0));
    }

    #[test]
    fn test_degenerate_input_is_null() {
        let p = params(&[(CURRENT_TIME_PARAM, 1.0)]);
        for calculator in Calculator::ALL {
            assert_eq!(calculator.compute(&[], &p), None, "{}", calculator.as_str());
        }
        // missing parameter
        assert_eq!(Calculator::RatioAbove.compute(&[1.0], &p), None);
    }

    #[test]
    fn test_unknown_calculator_fails_validation() {
        let spec = SeriesFeatureSpec {
            series: SeriesKind::GasUsed,
            calculator: "approximate_entropy".to_string(),
            params: FeatureParams::new(),
        };
        assert!(matches!(
            spec.validate(),
            Err(AnalysisError::UnknownFeature(name)) if name == "approximate_entropy"
        ));
    }

    #[test]
    fn test_missing_required_param_fails_validation() {
        let spec = SeriesFeatureSpec::new(SeriesKind::BlockTimestamp, Calculator::TimeSinceFirst);
        assert!(matches!(spec.validate(), Err(AnalysisError::InvalidConfig(_))));
        assert!(spec
            .with_param(CURRENT_TIME_PARAM, 0.0)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_column_names() {
        let spec = SeriesFeatureSpec::new(SeriesKind::BlockTimestamp, Calculator::RatioTxTimeSinceTime)
            .with_param("time", 3600.0)
            .with_param(CURRENT_TIME_PARAM, 1_700_000_000.0);
        assert_eq!(
            spec.column_name(),
            "block_timestamp__ratio_tx_time_since_time__time_3600"
        );
        assert_eq!(
            SeriesFeatureSpec::new(SeriesKind::Value, Calculator::Median).column_name(),
            "value__median"
        );
    }
}
