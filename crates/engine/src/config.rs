//! Engine configuration loaded from environment variables.

use std::time::Duration;

/// How `add_item` treats a stock shortfall reported by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StockCheckMode {
    /// Reject the add when the merged quantity exceeds available stock.
    #[default]
    Strict,

    /// Log a warning and proceed; the checkout lock is the real gate.
    Advisory,
}

impl StockCheckMode {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "strict" => Some(StockCheckMode::Strict),
            "advisory" => Some(StockCheckMode::Advisory),
            _ => None,
        }
    }
}

/// Engine configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `CART_CACHE_TTL_SECS` — cart fast-store TTL (default: 7 days)
/// - `RESERVATION_WINDOW_SECS` — checkout lock lifetime (default: 900)
/// - `STOCK_CHECK` — `"strict"` or `"advisory"` (default: `"strict"`)
/// - `REVALIDATE_PRICES` — refresh drifted price snapshots on cart reads
///   (default: `false`)
/// - `ORDER_ID_PREFIX` — prefix of generated order IDs (default: `"ORD"`)
/// - `PAYMENT_CODE_PREFIX` — prefix of payment codes (default: `"PAY"`)
/// - `CURRENCY` — ISO currency code for new carts (default: `"USD"`)
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub cart_cache_ttl_secs: u64,
    pub reservation_window_secs: u64,
    pub stock_check: StockCheckMode,
    pub revalidate_prices: bool,
    pub order_id_prefix: String,
    pub payment_code_prefix: String,
    pub currency: String,
}

impl EngineConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cart_cache_ttl_secs: std::env::var("CART_CACHE_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.cart_cache_ttl_secs),
            reservation_window_secs: std::env::var("RESERVATION_WINDOW_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.reservation_window_secs),
            stock_check: std::env::var("STOCK_CHECK")
                .ok()
                .and_then(|v| StockCheckMode::parse(&v))
                .unwrap_or(defaults.stock_check),
            revalidate_prices: std::env::var("REVALIDATE_PRICES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.revalidate_prices),
            order_id_prefix: std::env::var("ORDER_ID_PREFIX")
                .unwrap_or(defaults.order_id_prefix),
            payment_code_prefix: std::env::var("PAYMENT_CODE_PREFIX")
                .unwrap_or(defaults.payment_code_prefix),
            currency: std::env::var("CURRENCY").unwrap_or(defaults.currency),
        }
    }

    /// Returns the cart cache TTL as a [`Duration`].
    pub fn cart_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cart_cache_ttl_secs)
    }

    /// Returns the reservation window as a [`chrono::Duration`].
    pub fn reservation_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.reservation_window_secs as i64)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cart_cache_ttl_secs: 604_800,
            reservation_window_secs: 900,
            stock_check: StockCheckMode::Strict,
            revalidate_prices: false,
            order_id_prefix: "ORD".to_string(),
            payment_code_prefix: "PAY".to_string(),
            currency: "USD".to_string(),
        }
    }
}
