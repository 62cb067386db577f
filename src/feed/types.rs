//! Feed data types

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of event carried by a feed frame (the `ev` field)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    /// Trade execution (`"T"`), the only kind forwarded downstream
    Trade,
    /// Connection/auth status message
    Status,
    /// Anything else the feed sends (quotes, aggregates, ...)
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Trade => "T",
            EventKind::Status => "status",
            EventKind::Other(tag) => tag,
        }
    }
}

impl From<String> for EventKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "T" => EventKind::Trade,
            "status" => EventKind::Status,
            _ => EventKind::Other(tag),
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

/// A single trade tick
///
/// Serialized with the feed's own field names so the payload published on the
/// bus has the same shape as an inbound trade event. Deserialization always goes
/// through [`RawEvent`] validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEvent")]
pub struct Tick {
    /// Event kind tag
    #[serde(rename = "ev")]
    pub event: EventKind,
    /// Upper-case ticker symbol
    #[serde(rename = "sym")]
    pub symbol: String,
    /// Trade price, always positive
    #[serde(rename = "p")]
    pub price: Decimal,
    /// Exchange trade time
    #[serde(rename = "t", with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Trade size in shares
    #[serde(rename = "s")]
    pub size: u64,
}

impl Tick {
    /// Build a trade tick, canonicalizing the symbol
    pub fn trade(
        symbol: impl AsRef<str>,
        price: Decimal,
        timestamp: DateTime<Utc>,
        size: u64,
    ) -> Self {
        Self {
            event: EventKind::Trade,
            symbol: symbol.as_ref().trim().to_uppercase(),
            price,
            timestamp,
            size,
        }
    }

    pub fn is_trade(&self) -> bool {
        self.event == EventKind::Trade
    }

    /// Trade time as epoch milliseconds
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

/// Tick validation errors
#[derive(Debug, Error)]
pub enum TickError {
    /// Frame is not valid JSON or has the wrong shape
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    /// A required trade field is absent
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    /// Symbol is empty after trimming
    #[error("empty symbol")]
    EmptySymbol,
    /// Price is zero or negative
    #[error("invalid price {0}")]
    InvalidPrice(Decimal),
    /// Timestamp cannot be represented
    #[error("invalid timestamp {0}")]
    InvalidTimestamp(i64),
}

/// Loosely-typed event as it appears on the wire
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEvent {
    #[serde(default)]
    pub ev: Option<String>,
    #[serde(default)]
    pub sym: Option<String>,
    #[serde(default)]
    pub p: Option<Decimal>,
    #[serde(default)]
    pub t: Option<i64>,
    #[serde(default)]
    pub s: Option<u64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl TryFrom<RawEvent> for Tick {
    type Error = TickError;

    fn try_from(raw: RawEvent) -> Result<Self, Self::Error> {
        let event = EventKind::from(raw.ev.ok_or(TickError::MissingField("ev"))?);

        let symbol = raw.sym.ok_or(TickError::MissingField("sym"))?;
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(TickError::EmptySymbol);
        }

        let price = raw.p.ok_or(TickError::MissingField("p"))?;
        if price <= Decimal::ZERO {
            return Err(TickError::InvalidPrice(price));
        }

        let millis = raw.t.ok_or(TickError::MissingField("t"))?;
        let timestamp = Utc
            .timestamp_millis_opt(millis)
            .single()
            .ok_or(TickError::InvalidTimestamp(millis))?;

        Ok(Tick {
            event,
            symbol,
            price,
            timestamp,
            size: raw.s.unwrap_or(0),
        })
    }
}

/// Decoded feed event
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// Validated trade tick
    Trade(Tick),
    /// Status message (`auth_success`, `auth_failed`, `connected`, ...)
    Status { status: String, message: String },
    /// Event kind we do not consume
    Ignored(String),
}

impl FeedEvent {
    /// Classify a raw event, validating trade fields only for trades
    pub fn from_raw(raw: RawEvent) -> Result<Self, TickError> {
        let kind = EventKind::from(raw.ev.clone().ok_or(TickError::MissingField("ev"))?);
        match kind {
            EventKind::Trade => Ok(FeedEvent::Trade(Tick::try_from(raw)?)),
            EventKind::Status => Ok(FeedEvent::Status {
                status: raw.status.unwrap_or_default(),
                message: raw.message.unwrap_or_default(),
            }),
            EventKind::Other(tag) => Ok(FeedEvent::Ignored(tag)),
        }
    }
}

/// Outbound control message (`auth` / `subscribe`)
#[derive(Debug, Serialize)]
pub struct ControlMessage<'a> {
    pub action: &'a str,
    pub params: &'a str,
}
