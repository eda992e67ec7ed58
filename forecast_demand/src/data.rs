//! Store roster, transaction history and daily demand series

use crate::error::{ForecastError, Result};
use crate::features::{ContextFeatureBuilder, ContextFeatures};
use chrono::NaiveDate;
use demand_math::GeoPoint;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

pub type StoreId = String;
pub type SkuId = String;

/// Urban/rural class of a store's catchment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locality {
    Urban,
    SemiUrban,
    Rural,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeCategory {
    Small,
    Medium,
    Large,
}

impl SizeCategory {
    pub fn rank(&self) -> i32 {
        *self as i32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomeBracket {
    Low,
    LowerMiddle,
    UpperMiddle,
    High,
}

impl IncomeBracket {
    pub fn rank(&self) -> i32 {
        *self as i32
    }
}

/// Administrative hierarchy of a location
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdminRegion {
    pub state: String,
    pub district: String,
    pub pincode: String,
}

impl AdminRegion {
    pub fn new(state: impl Into<String>, district: impl Into<String>, pincode: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            district: district.into(),
            pincode: pincode.into(),
        }
    }

    /// A location is resolvable once its state is known
    pub fn is_resolvable(&self) -> bool {
        !self.state.trim().is_empty()
    }
}

/// A retail store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Store {
    pub id: StoreId,
    pub location: GeoPoint,
    pub region: AdminRegion,
    pub locality: Locality,
    pub size: SizeCategory,
    pub income: IncomeBracket,
    /// Distinct days with at least one transaction; never decreases
    days_of_data: u32,
    pub active_skus: BTreeSet<SkuId>,
}

impl Store {
    pub fn new(
        id: impl Into<StoreId>,
        location: GeoPoint,
        region: AdminRegion,
        locality: Locality,
        size: SizeCategory,
        income: IncomeBracket,
    ) -> Self {
        Self {
            id: id.into(),
            location,
            region,
            locality,
            size,
            income,
            days_of_data: 0,
            active_skus: BTreeSet::new(),
        }
    }

    pub fn days_of_data(&self) -> u32 {
        self.days_of_data
    }

    /// Raise `days_of_data` to `days`; a lower count is ignored
    pub fn observe_history_days(&mut self, days: u32) {
        self.days_of_data = self.days_of_data.max(days);
    }

    pub fn with_days_of_data(mut self, days: u32) -> Self {
        self.observe_history_days(days);
        self
    }

    pub fn with_skus<I, S>(mut self, skus: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SkuId>,
    {
        self.active_skus.extend(skus.into_iter().map(Into::into));
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(ForecastError::validation("store id must not be empty"));
        }
        if !self.location.is_valid() {
            return Err(ForecastError::validation(format!(
                "store {} has invalid coordinates ({}, {})",
                self.id, self.location.lat, self.location.lon
            )));
        }
        if !self.region.is_resolvable() {
            return Err(ForecastError::validation(format!(
                "store {} has no resolvable state",
                self.id
            )));
        }
        Ok(())
    }
}

/// A single sale line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub date: NaiveDate,
    pub sku: SkuId,
    pub quantity: f64,
    pub price: f64,
}

impl Transaction {
    pub fn validate(&self) -> Result<()> {
        if self.sku.trim().is_empty() {
            return Err(ForecastError::validation("transaction has an empty SKU"));
        }
        if !self.quantity.is_finite() || self.quantity < 0.0 {
            return Err(ForecastError::validation(format!(
                "transaction for {} on {} has invalid quantity {}",
                self.sku, self.date, self.quantity
            )));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(ForecastError::validation(format!(
                "transaction for {} on {} has invalid price {}",
                self.sku, self.date, self.price
            )));
        }
        Ok(())
    }
}

/// SKU to category mapping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductCatalog {
    categories: HashMap<SkuId, String>,
}

impl ProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a SKU; categories are stored lowercase
    pub fn insert(&mut self, sku: impl Into<SkuId>, category: &str) {
        self.categories.insert(sku.into(), normalize_category(category));
    }

    pub fn with(mut self, sku: impl Into<SkuId>, category: &str) -> Self {
        self.insert(sku, category);
        self
    }

    pub fn category_of(&self, sku: &str) -> Option<&str> {
        self.categories.get(sku).map(String::as_str)
    }

    /// SKUs of `category` among `skus`
    pub fn skus_in<'a>(&'a self, category: &'a str, skus: impl IntoIterator<Item = &'a SkuId>) -> Vec<&'a SkuId> {
        skus.into_iter()
            .filter(|s| self.category_of(s) == Some(category))
            .collect()
    }
}

/// Lowercase, trimmed category name
pub fn normalize_category(category: &str) -> String {
    category.trim().to_lowercase()
}

/// Transaction history of one store, aggregated to daily demand
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SalesHistory {
    daily: BTreeMap<SkuId, BTreeMap<NaiveDate, f64>>,
    transaction_counts: HashMap<SkuId, usize>,
    active_days: BTreeSet<NaiveDate>,
}

impl SalesHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_transactions<'a, I>(transactions: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Transaction>,
    {
        let mut history = Self::new();
        for tx in transactions {
            history.record(tx)?;
        }
        Ok(history)
    }

    pub fn record(&mut self, tx: &Transaction) -> Result<()> {
        tx.validate()?;
        *self
            .daily
            .entry(tx.sku.clone())
            .or_default()
            .entry(tx.date)
            .or_insert(0.0) += tx.quantity;
        *self.transaction_counts.entry(tx.sku.clone()).or_insert(0) += 1;
        self.active_days.insert(tx.date);
        Ok(())
    }

    pub fn days_of_data(&self) -> u32 {
        self.active_days.len() as u32
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.active_days.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.active_days.last().copied()
    }

    pub fn transaction_count(&self, sku: &str) -> usize {
        self.transaction_counts.get(sku).copied().unwrap_or(0)
    }

    pub fn skus(&self) -> impl Iterator<Item = &SkuId> {
        self.daily.keys()
    }

    /// Zero-filled daily demand of `sku` over `[start, end]`
    pub fn sku_daily(&self, sku: &str, start: NaiveDate, end: NaiveDate) -> Vec<(NaiveDate, f64)> {
        let empty = BTreeMap::new();
        let days = self.daily.get(sku).unwrap_or(&empty);
        start
            .iter_days()
            .take_while(|d| *d <= end)
            .map(|d| (d, days.get(&d).copied().unwrap_or(0.0)))
            .collect()
    }

    /// Zero-filled daily demand summed across every SKU of `category`
    pub fn category_daily(
        &self,
        catalog: &ProductCatalog,
        category: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Vec<(NaiveDate, f64)> {
        let mut totals: BTreeMap<NaiveDate, f64> = start
            .iter_days()
            .take_while(|d| *d <= end)
            .map(|d| (d, 0.0))
            .collect();
        for (sku, days) in &self.daily {
            if catalog.category_of(sku) != Some(category) {
                continue;
            }
            for (date, qty) in days.range(start..=end) {
                if let Some(total) = totals.get_mut(date) {
                    *total += qty;
                }
            }
        }
        totals.into_iter().collect()
    }

    /// Share of `sku` in its category's demand over the whole history
    pub fn category_share(&self, catalog: &ProductCatalog, sku: &str) -> Option<f64> {
        let category = catalog.category_of(sku)?;
        let total_of = |s: &str| -> f64 {
            self.daily
                .get(s)
                .map_or(0.0, |days| days.values().sum())
        };
        let category_total: f64 = self
            .daily
            .keys()
            .filter(|s| catalog.category_of(s) == Some(category))
            .map(|s| total_of(s))
            .sum();
        if category_total <= 0.0 {
            return None;
        }
        Some(total_of(sku) / category_total)
    }
}

/// Aligned dates, demand and context features of one series
#[derive(Debug, Clone, PartialEq)]
pub struct DemandSeries {
    dates: Vec<NaiveDate>,
    values: Vec<f64>,
    features: Vec<ContextFeatures>,
}

impl DemandSeries {
    pub fn new(dates: Vec<NaiveDate>, values: Vec<f64>, features: Vec<ContextFeatures>) -> Result<Self> {
        if dates.len() != values.len() || dates.len() != features.len() {
            return Err(ForecastError::DataError(format!(
                "Series lengths differ: {} dates, {} values, {} feature rows",
                dates.len(),
                values.len(),
                features.len()
            )));
        }
        if dates.windows(2).any(|w| (w[1] - w[0]).num_days() != 1) {
            return Err(ForecastError::DataError(
                "Series dates must be consecutive days".to_string(),
            ));
        }
        if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(ForecastError::DataError(
                "Series values must be finite and non-negative".to_string(),
            ));
        }
        Ok(Self {
            dates,
            values,
            features,
        })
    }

    /// Attach context features to zero-filled daily rows
    pub fn from_daily(rows: &[(NaiveDate, f64)], builder: &ContextFeatureBuilder, store: &Store) -> Result<Self> {
        let dates: Vec<NaiveDate> = rows.iter().map(|(d, _)| *d).collect();
        let values: Vec<f64> = rows.iter().map(|(_, v)| *v).collect();
        let features = dates.iter().map(|d| builder.build(store, *d)).collect();
        Self::new(dates, values, features)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn features(&self) -> &[ContextFeatures] {
        &self.features
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// Rows `[start, end)`
    pub fn slice(&self, start: usize, end: usize) -> Result<Self> {
        if start > end || end > self.len() {
            return Err(ForecastError::DataError(format!(
                "Invalid slice {}..{} of series with {} rows",
                start,
                end,
                self.len()
            )));
        }
        Ok(Self {
            dates: self.dates[start..end].to_vec(),
            values: self.values[start..end].to_vec(),
            features: self.features[start..end].to_vec(),
        })
    }

    /// Split off the final `tail` rows
    pub fn split_tail(&self, tail: usize) -> Result<(Self, Self)> {
        if tail >= self.len() {
            return Err(ForecastError::DataError(format!(
                "Cannot hold out {} rows of a {}-row series",
                tail,
                self.len()
            )));
        }
        let cut = self.len() - tail;
        Ok((self.slice(0, cut)?, self.slice(cut, self.len())?))
    }
}

#[derive(Debug, Deserialize)]
struct StoreRow {
    id: String,
    lat: f64,
    lon: f64,
    state: String,
    district: String,
    pincode: String,
    locality: Locality,
    size: SizeCategory,
    income: IncomeBracket,
}

/// Load transactions from a CSV with header `date,sku,quantity,price`
pub fn load_transactions_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Transaction>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut transactions = Vec::new();
    for (line, row) in reader.deserialize::<Transaction>().enumerate() {
        let tx = row?;
        tx.validate().map_err(|e| {
            ForecastError::validation(format!("row {}: {}", line + 2, e))
        })?;
        transactions.push(tx);
    }
    Ok(transactions)
}

/// Load a store roster from a CSV with header
/// `id,lat,lon,state,district,pincode,locality,size,income`
pub fn load_stores_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Store>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut stores = Vec::new();
    for row in reader.deserialize::<StoreRow>() {
        let row = row?;
        let store = Store::new(
            row.id,
            GeoPoint::new(row.lat, row.lon),
            AdminRegion::new(row.state, row.district, row.pincode),
            row.locality,
            row.size,
            row.income,
        );
        store.validate()?;
        stores.push(store);
    }
    Ok(stores)
}
