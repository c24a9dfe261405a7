//! Store-wide settings and their cache.
//!
//! Settings are read from a [`SettingsSource`] once and cached by
//! [`SettingsService`]. The cache only changes through
//! [`SettingsService::invalidate`] and [`SettingsService::refresh`].

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use common::Money;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::pricing::{ShippingRates, is_valid_vat_rate};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Cannot read settings from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed settings: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid settings: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSettings {
    pub currency: String,
    /// VAT percentage applied to lines that do not carry their own rate.
    pub default_vat_rate: Decimal,
    #[serde(default)]
    pub shipping: ShippingRates,
    pub invoice_prefix: String,
    /// Stock level at or below which an item is reported as running low.
    #[serde(default = "default_low_stock_threshold")]
    pub low_stock_threshold: u32,
}

fn default_low_stock_threshold() -> u32 {
    5
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            currency: "XOF".to_string(),
            default_vat_rate: Decimal::from(18),
            shipping: ShippingRates {
                default_rate: Money::from_cents(2_000),
                ..ShippingRates::default()
            },
            invoice_prefix: "INV".to_string(),
            low_stock_threshold: default_low_stock_threshold(),
        }
    }
}

impl StoreSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.currency.trim().is_empty() {
            return Err(SettingsError::Invalid("currency is empty".to_string()));
        }
        if self.invoice_prefix.trim().is_empty() {
            return Err(SettingsError::Invalid("invoice_prefix is empty".to_string()));
        }
        if !is_valid_vat_rate(self.default_vat_rate) {
            return Err(SettingsError::Invalid(format!(
                "default_vat_rate {} is outside 0..=100",
                self.default_vat_rate
            )));
        }
        if self.shipping.default_rate.is_negative()
            || self.shipping.zones.values().any(Money::is_negative)
        {
            return Err(SettingsError::Invalid(
                "shipping rates cannot be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where settings come from.
#[async_trait]
pub trait SettingsSource: Send + Sync {
    async fn load(&self) -> Result<StoreSettings, SettingsError>;

    /// Short label for logs.
    fn describe(&self) -> String;
}

/// Fixed settings, used by tests and when no settings file is configured.
#[derive(Debug, Clone, Default)]
pub struct StaticSettings(pub StoreSettings);

#[async_trait]
impl SettingsSource for StaticSettings {
    async fn load(&self) -> Result<StoreSettings, SettingsError> {
        Ok(self.0.clone())
    }

    fn describe(&self) -> String {
        "static".to_string()
    }
}

/// Settings read from a JSON document on disk.
#[derive(Debug, Clone)]
pub struct JsonFileSettings {
    path: PathBuf,
}

impl JsonFileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SettingsSource for JsonFileSettings {
    async fn load(&self) -> Result<StoreSettings, SettingsError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| SettingsError::Io {
                path: self.path.display().to_string(),
                source,
            })?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

/// Cached access to the current settings.
pub struct SettingsService {
    source: Box<dyn SettingsSource>,
    cached: RwLock<Option<Arc<StoreSettings>>>,
}

impl SettingsService {
    pub fn new(source: impl SettingsSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            cached: RwLock::new(None),
        }
    }

    /// Settings service over fixed values.
    pub fn fixed(settings: StoreSettings) -> Self {
        Self::new(StaticSettings(settings))
    }

    /// Returns the cached settings, loading them on first use.
    pub async fn current(&self) -> Result<Arc<StoreSettings>, SettingsError> {
        if let Some(settings) = self.cached.read().await.as_ref() {
            return Ok(Arc::clone(settings));
        }
        self.refresh().await
    }

    /// Drops the cached value; the next `current` call reloads.
    pub async fn invalidate(&self) {
        self.cached.write().await.take();
        tracing::debug!(source = %self.source.describe(), "settings cache invalidated");
    }

    /// Reloads from the source and replaces the cache.
    ///
    /// A failed load leaves the previous value in place.
    pub async fn refresh(&self) -> Result<Arc<StoreSettings>, SettingsError> {
        let loaded = self.source.load().await.inspect_err(|e| {
            tracing::error!(source = %self.source.describe(), error = %e, "failed to load settings");
        })?;
        loaded.validate()?;

        let loaded = Arc::new(loaded);
        *self.cached.write().await = Some(Arc::clone(&loaded));
        tracing::info!(
            source = %self.source.describe(),
            currency = %loaded.currency,
            "settings loaded"
        );
        Ok(loaded)
    }
}
