//! Market metadata boundary.
//!
//! Supported timeframes and default instruments come from an external
//! catalog; this module only defines what is asked of it and assembles the
//! init-config document a front end loads on start-up.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ChanError;

/// Markets a catalog may serve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Market {
    A,
    Hk,
    Fx,
    Us,
    Futures,
    NyFutures,
    Currency,
    CurrencySpot,
}

impl Market {
    pub const ALL: [Market; 8] = [
        Market::A,
        Market::Hk,
        Market::Fx,
        Market::Us,
        Market::Futures,
        Market::NyFutures,
        Market::Currency,
        Market::CurrencySpot,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Market::A => "a",
            Market::Hk => "hk",
            Market::Fx => "fx",
            Market::Us => "us",
            Market::Futures => "futures",
            Market::NyFutures => "ny_futures",
            Market::Currency => "currency",
            Market::CurrencySpot => "currency_spot",
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Market {
    type Err = ChanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Market::ALL
            .into_iter()
            .find(|m| m.id() == s)
            .ok_or(ChanError::InvalidValue("unknown market"))
    }
}

/// Source of per-market metadata
pub trait MarketCatalog: Send + Sync {
    /// Timeframes the market supports, in display order.
    fn frequencies(&self, market: Market) -> Vec<String>;

    fn default_code(&self, market: Market) -> Option<String>;

    /// IANA name of the server's local timezone.
    fn server_timezone(&self) -> String;
}

/// In-memory catalog
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    timezone: String,
    markets: HashMap<Market, (Vec<String>, String)>,
}

impl StaticCatalog {
    pub fn new(timezone: impl Into<String>) -> Self {
        Self {
            timezone: timezone.into(),
            markets: HashMap::new(),
        }
    }

    pub fn market<S: Into<String>>(
        mut self,
        market: Market,
        frequencies: impl IntoIterator<Item = S>,
        default_code: impl Into<String>,
    ) -> Self {
        let frequencies = frequencies.into_iter().map(Into::into).collect();
        self.markets.insert(market, (frequencies, default_code.into()));
        self
    }
}

impl MarketCatalog for StaticCatalog {
    fn frequencies(&self, market: Market) -> Vec<String> {
        self.markets
            .get(&market)
            .map(|(freqs, _)| freqs.clone())
            .unwrap_or_default()
    }

    fn default_code(&self, market: Market) -> Option<String> {
        self.markets.get(&market).map(|(_, code)| code.clone())
    }

    fn server_timezone(&self) -> String {
        self.timezone.clone()
    }
}

/// Start-up document for a front end
///
/// Field names match the JSON the front end reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitConfig {
    pub market_frequencys: BTreeMap<String, Vec<String>>,
    pub market_default_codes: BTreeMap<String, String>,
    pub server_timezone: String,
}

impl InitConfig {
    /// Query `catalog` for every market. Markets without a default code are
    /// left out of `market_default_codes`.
    pub fn collect(catalog: &dyn MarketCatalog) -> Self {
        let market_frequencys = Market::ALL
            .into_iter()
            .map(|m| (m.id().to_string(), catalog.frequencies(m)))
            .collect();
        let market_default_codes = Market::ALL
            .into_iter()
            .filter_map(|m| catalog.default_code(m).map(|code| (m.id().to_string(), code)))
            .collect();
        Self {
            market_frequencys,
            market_default_codes,
            server_timezone: catalog.server_timezone(),
        }
    }
}
