use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of one coin's current market stats, one per `/coins/markets` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub image: Option<String>,
    pub rank: Option<u32>,
    pub current_price: Option<f64>,
    pub market_cap: Option<f64>,
    pub volume_24h: Option<f64>,
    pub percent_change_1h: Option<f64>,
    pub percent_change_24h: Option<f64>,
    pub percent_change_7d: Option<f64>,
    pub percent_change_30d: Option<f64>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Listing {
    pub fn percent_change(&self, window: ChangeWindow) -> Option<f64> {
        match window {
            ChangeWindow::H1 => self.percent_change_1h,
            ChangeWindow::H24 => self.percent_change_24h,
            ChangeWindow::D7 => self.percent_change_7d,
            ChangeWindow::D30 => self.percent_change_30d,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeWindow {
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "24h")]
    H24,
    #[serde(rename = "7d")]
    D7,
    #[serde(rename = "30d")]
    D30,
}

impl ChangeWindow {
    pub fn label(self) -> &'static str {
        match self {
            ChangeWindow::H1 => "1h",
            ChangeWindow::H24 => "24h",
            ChangeWindow::D7 => "7d",
            ChangeWindow::D30 => "30d",
        }
    }
}

/// One sample of a historical series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    /// `None` when upstream reported a null price for this slot.
    pub price: Option<f64>,
    pub volume_24h: Option<f64>,
    pub market_cap: Option<f64>,
}

/// Entry of `/coins/list`, used to map ticker symbols onto CoinGecko ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinRef {
    pub id: String,
    pub symbol: String,
    pub name: String,
}
