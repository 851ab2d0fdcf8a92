/*
[INPUT]:  Exchange market families and stream parameter vocabularies
[OUTPUT]: Typed Rust enums with serialization support
[POS]:    Data layer - shared enums for REST and streaming
[UPDATE]: When adding markets, intervals or depth speeds
*/

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::http::BinanceError;

/// Market family a REST call or stream belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Market {
    Spot,
    Margin,
    Futures,
}

impl Market {
    pub const ALL: [Market; 3] = [Market::Spot, Market::Margin, Market::Futures];

    /// REST path of the user data stream (listen key) resource
    pub fn user_stream_path(self) -> &'static str {
        match self {
            Market::Spot => "/api/v3/userDataStream",
            Market::Margin => "/sapi/v1/userDataStream",
            Market::Futures => "/fapi/v1/listenKey",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Market::Spot => "spot",
            Market::Margin => "margin",
            Market::Futures => "futures",
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Market {
    type Err = BinanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "spot" => Ok(Market::Spot),
            "margin" => Ok(Market::Margin),
            "futures" | "usdm" => Ok(Market::Futures),
            other => Err(BinanceError::Validation(format!("unknown market '{other}'"))),
        }
    }
}

/// Candlestick interval accepted by the kline streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KlineInterval {
    #[serde(rename = "1s")]
    OneSecond,
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "3m")]
    ThreeMinutes,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "2h")]
    TwoHours,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "8h")]
    EightHours,
    #[serde(rename = "12h")]
    TwelveHours,
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "3d")]
    ThreeDays,
    #[serde(rename = "1w")]
    OneWeek,
    #[serde(rename = "1M")]
    OneMonth,
}

impl KlineInterval {
    pub fn as_str(self) -> &'static str {
        match self {
            KlineInterval::OneSecond => "1s",
            KlineInterval::OneMinute => "1m",
            KlineInterval::ThreeMinutes => "3m",
            KlineInterval::FiveMinutes => "5m",
            KlineInterval::FifteenMinutes => "15m",
            KlineInterval::ThirtyMinutes => "30m",
            KlineInterval::OneHour => "1h",
            KlineInterval::TwoHours => "2h",
            KlineInterval::FourHours => "4h",
            KlineInterval::SixHours => "6h",
            KlineInterval::EightHours => "8h",
            KlineInterval::TwelveHours => "12h",
            KlineInterval::OneDay => "1d",
            KlineInterval::ThreeDays => "3d",
            KlineInterval::OneWeek => "1w",
            KlineInterval::OneMonth => "1M",
        }
    }
}

impl fmt::Display for KlineInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KlineInterval {
    type Err = BinanceError;

    // Case matters: "1m" is a minute, "1M" a month.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let interval = match s {
            "1s" => KlineInterval::OneSecond,
            "1m" => KlineInterval::OneMinute,
            "3m" => KlineInterval::ThreeMinutes,
            "5m" => KlineInterval::FiveMinutes,
            "15m" => KlineInterval::FifteenMinutes,
            "30m" => KlineInterval::ThirtyMinutes,
            "1h" => KlineInterval::OneHour,
            "2h" => KlineInterval::TwoHours,
            "4h" => KlineInterval::FourHours,
            "6h" => KlineInterval::SixHours,
            "8h" => KlineInterval::EightHours,
            "12h" => KlineInterval::TwelveHours,
            "1d" => KlineInterval::OneDay,
            "3d" => KlineInterval::ThreeDays,
            "1w" => KlineInterval::OneWeek,
            "1M" => KlineInterval::OneMonth,
            other => {
                return Err(BinanceError::Validation(format!(
                    "unknown kline interval '{other}'"
                )));
            }
        };
        Ok(interval)
    }
}

/// Push cadence of the depth streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateSpeed {
    #[serde(rename = "100ms")]
    Ms100,
    #[serde(rename = "250ms")]
    Ms250,
    #[serde(rename = "500ms")]
    Ms500,
    #[serde(rename = "1000ms")]
    Ms1000,
}

impl UpdateSpeed {
    pub fn as_str(self) -> &'static str {
        match self {
            UpdateSpeed::Ms100 => "100ms",
            UpdateSpeed::Ms250 => "250ms",
            UpdateSpeed::Ms500 => "500ms",
            UpdateSpeed::Ms1000 => "1000ms",
        }
    }

    /// Whether the given market publishes depth at this cadence
    pub fn is_supported_on(self, market: Market) -> bool {
        match market {
            Market::Spot | Market::Margin => {
                matches!(self, UpdateSpeed::Ms100 | UpdateSpeed::Ms1000)
            }
            Market::Futures => matches!(
                self,
                UpdateSpeed::Ms100 | UpdateSpeed::Ms250 | UpdateSpeed::Ms500
            ),
        }
    }
}

impl fmt::Display for UpdateSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateSpeed {
    type Err = BinanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "100ms" | "100" => Ok(UpdateSpeed::Ms100),
            "250ms" | "250" => Ok(UpdateSpeed::Ms250),
            "500ms" | "500" => Ok(UpdateSpeed::Ms500),
            "1000ms" | "1000" | "1s" => Ok(UpdateSpeed::Ms1000),
            other => Err(BinanceError::Validation(format!(
                "unknown update speed '{other}'"
            ))),
        }
    }
}
