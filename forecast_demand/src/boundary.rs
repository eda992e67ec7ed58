//! Contracts with the decision, impact-estimator and alert collaborators

use crate::data::{SalesHistory, SkuId, StoreId};
use crate::error::{ForecastError, Result};
use crate::forecast::Forecast;
use crate::metrics::{forecast_accuracy, ForecastAccuracy};
use chrono::{Duration, NaiveDate};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Inventory above this multiple of predicted demand needs no restock
pub const ZERO_RESTOCK_MULTIPLE: f64 = 1.5;

/// Window of the alert moving average
pub const ALERT_AVERAGE_DAYS: i64 = 30;

/// Whether the decision layer should recommend a zero restock
///
/// True iff `current_inventory > 1.5 * predicted_demand`; equality is not enough.
pub fn requires_zero_restock(current_inventory: f64, forecast: &Forecast) -> Result<bool> {
    if !current_inventory.is_finite() {
        return Err(ForecastError::validation(format!(
            "inventory must be finite, got {}",
            current_inventory
        )));
    }
    if current_inventory < 0.0 {
        return Err(ForecastError::NegativeInventory(current_inventory));
    }
    Ok(current_inventory > ZERO_RESTOCK_MULTIPLE * forecast.predicted_demand())
}

/// An issued forecast and, once known, the realised demand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub forecast: Forecast,
    pub actual: Option<f64>,
}

/// Append-only record of issued forecasts
#[derive(Debug, Default)]
pub struct ForecastLedger {
    entries: RwLock<Vec<LedgerEntry>>,
}

impl ForecastLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, forecast: Forecast) {
        self.entries.write().push(LedgerEntry {
            forecast,
            actual: None,
        });
    }

    /// Attach realised demand to every open forecast for that store, SKU and day
    ///
    /// Returns the number of entries updated.
    pub fn record_actual(&self, store_id: &str, sku: &str, date: NaiveDate, actual: f64) -> Result<usize> {
        if !actual.is_finite() || actual < 0.0 {
            return Err(ForecastError::validation(format!(
                "actual demand must be finite and non-negative, got {}",
                actual
            )));
        }
        let mut entries = self.entries.write();
        let mut updated = 0;
        for entry in entries.iter_mut().filter(|e| {
            e.actual.is_none()
                && e.forecast.store_id() == store_id
                && e.forecast.sku() == sku
                && e.forecast.target_date() == date
        }) {
            entry.actual = Some(actual);
            updated += 1;
        }
        Ok(updated)
    }

    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Accuracy over entries with realised demand; `None` when there are none
    pub fn accuracy(&self) -> Result<Option<ForecastAccuracy>> {
        let entries = self.entries.read();
        let (predicted, actual): (Vec<f64>, Vec<f64>) = entries
            .iter()
            .filter_map(|e| e.actual.map(|a| (e.forecast.predicted_demand(), a)))
            .unzip();
        if predicted.is_empty() {
            return Ok(None);
        }
        Ok(Some(forecast_accuracy(&predicted, &actual)?))
    }
}

/// What the alert collaborator needs for spike detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertSnapshot {
    pub store_id: StoreId,
    pub sku: SkuId,
    pub forecast: Forecast,
    pub moving_average_30: f64,
}

/// Mean daily demand of `sku` over the 30 days ending the day before `as_of`
///
/// Days without sales count as zero. The window is cut at the first day of
/// history, and an empty window averages to zero.
pub fn moving_average_30(history: &SalesHistory, sku: &str, as_of: NaiveDate) -> f64 {
    let end = as_of - Duration::days(1);
    let start = end - Duration::days(ALERT_AVERAGE_DAYS - 1);
    let start = match history.first_date() {
        Some(first) if first > start => first,
        Some(_) => start,
        None => return 0.0,
    };
    if start > end {
        return 0.0;
    }
    let rows = history.sku_daily(sku, start, end);
    rows.iter().map(|(_, v)| v).sum::<f64>() / rows.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Transaction;
    use crate::forecast::DataSource;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, d).unwrap()
    }

    fn forecast(predicted: f64, date: NaiveDate) -> Forecast {
        Forecast::new("s1", "rice", date, predicted, (predicted, predicted), 0.8, 1.0, DataSource::StoreSpecific)
            .unwrap()
    }

    #[rstest]
    #[case(15.0, false)]
    #[case(15.000001, true)]
    #[case(14.0, false)]
    #[case(30.0, true)]
    fn zero_restock_uses_strict_inequality(#[case] inventory: f64, #[case] expected: bool) {
        assert_eq!(requires_zero_restock(inventory, &forecast(10.0, day(1))).unwrap(), expected);
    }

    #[test]
    fn negative_inventory_is_rejected() {
        let err = requires_zero_restock(-1.0, &forecast(10.0, day(1))).unwrap_err();
        assert!(matches!(err, ForecastError::NegativeInventory(v) if v == -1.0));
        assert!(err.is_validation());
    }

    #[test]
    fn ledger_matches_actuals() {
        let ledger = ForecastLedger::new();
        assert!(ledger.accuracy().unwrap().is_none());
        ledger.record(forecast(10.0, day(1)));
        ledger.record(forecast(20.0, day(2)));
        assert_eq!(ledger.record_actual("s1", "rice", day(1), 8.0).unwrap(), 1);
        assert_eq!(ledger.record_actual("s1", "rice", day(1), 9.0).unwrap(), 0);
        assert_eq!(ledger.record_actual("s2", "rice", day(2), 9.0).unwrap(), 0);

        let accuracy = ledger.accuracy().unwrap().unwrap();
        assert_eq!(accuracy.count, 1);
        assert_relative_eq!(accuracy.mae, 2.0);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn moving_average_counts_missing_days_as_zero() {
        let txs: Vec<Transaction> = (1..=30)
            .map(|d| Transaction {
                date: day(d),
                sku: "rice".into(),
                quantity: if d % 2 == 0 { 6.0 } else { 0.0 },
                price: 50.0,
            })
            .collect();
        let history = SalesHistory::from_transactions(&txs).unwrap();
        assert_relative_eq!(moving_average_30(&history, "rice", NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()), 3.0);
        assert_relative_eq!(moving_average_30(&history, "dal", day(20)), 0.0);
        assert_relative_eq!(moving_average_30(&SalesHistory::new(), "rice", day(20)), 0.0);
    }
}
