/*
[INPUT]:  Response headers from REST calls, tagged by market
[OUTPUT]: Latest per-market usage counters (weight, order counts)
[POS]:    HTTP layer - rate-limit bookkeeping owned by the client handle
[UPDATE]: When the exchange adds new usage headers
*/

use std::collections::HashMap;
use std::sync::RwLock;

use reqwest::header::HeaderMap;

use crate::types::Market;

const USAGE_HEADER_PREFIXES: [&str; 3] = ["x-mbx-used-weight", "x-mbx-order-count", "x-sapi-used"];

/// Usage counters reported by the exchange, keyed by lowercase header name
pub type UsageSnapshot = HashMap<String, u64>;

/// Latest usage headers seen per market.
///
/// Held behind an `Arc` by [`BinanceClient`](crate::BinanceClient) so clones of
/// one client share counters while separate clients stay independent.
#[derive(Debug, Default)]
pub struct RateLimitState {
    usage: RwLock<HashMap<Market, UsageSnapshot>>,
}

impl RateLimitState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge the usage headers of one response into the market's snapshot
    pub fn record(&self, market: Market, headers: &HeaderMap) {
        let updates: Vec<(String, u64)> = headers
            .iter()
            .filter_map(|(name, value)| {
                let name = name.as_str();
                if !USAGE_HEADER_PREFIXES
                    .iter()
                    .any(|prefix| name.starts_with(prefix))
                {
                    return None;
                }
                let count = value.to_str().ok()?.trim().parse::<u64>().ok()?;
                Some((name.to_string(), count))
            })
            .collect();

        if updates.is_empty() {
            return;
        }

        let mut guard = match self.usage.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.entry(market).or_default().extend(updates);
    }

    /// Copy of every counter recorded for the market
    pub fn snapshot(&self, market: Market) -> UsageSnapshot {
        let guard = match self.usage.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.get(&market).cloned().unwrap_or_default()
    }

    /// Request weight used in the current one-minute window
    pub fn used_weight(&self, market: Market) -> Option<u64> {
        let snapshot = self.snapshot(market);
        snapshot
            .get("x-mbx-used-weight-1m")
            .or_else(|| snapshot.get("x-sapi-used-ip-weight-1m"))
            .copied()
    }
}
