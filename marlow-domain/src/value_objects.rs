//! Value Objects for the Marlow Domain
//!
//! Immutable, validated domain primitives.
//! All value objects enforce invariants at construction time.

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain errors for value object validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Price must be strictly positive
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    /// Quantity must be non-negative
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    /// Trade date must be a valid YYYYMMDD calendar date
    #[error("Invalid trade date: {0}")]
    InvalidTradeDate(String),

    /// Unknown enum discriminant on the wire
    #[error("Invalid discriminant: {0}")]
    InvalidDiscriminant(String),

    /// Currency is not in the scale table
    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),
}

// =============================================================================
// Price
// =============================================================================

/// Price represents a strictly positive decimal price.
///
/// # Invariants
/// - Must be > 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Price(Decimal);

impl Price {
    /// Create a new Price with validation.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPrice` if value <= 0
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value <= Decimal::ZERO {
            return Err(DomainError::InvalidPrice("Price must be positive".to_string()));
        }
        Ok(Self(value))
    }

    /// Get the underlying Decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Quantity
// =============================================================================

/// Quantity represents a non-negative decimal quantity.
///
/// Zero is a valid state: a busted execution has its quantity corrected to
/// zero in place, and re-aggregation excludes it. Strict positivity is an
/// ingest precondition, not a type invariant.
///
/// # Invariants
/// - Must be >= 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Quantity(Decimal);

impl Quantity {
    /// Create a new Quantity with validation.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidQuantity` if value < 0
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value < Decimal::ZERO {
            return Err(DomainError::InvalidQuantity("Quantity must be non-negative".to_string()));
        }
        Ok(Self(value))
    }

    /// Zero quantity (the busted state)
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Get the underlying Decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// True if this quantity is strictly positive
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// TradeDate
// =============================================================================

/// TradeDate is a calendar date carried on the wire as `YYYYMMDD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TradeDate(NaiveDate);

impl TradeDate {
    /// Wire format for trade and settle dates
    const FORMAT: &'static str = "%Y%m%d";

    /// Parse a `YYYYMMDD` string.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidTradeDate` for anything that is not an
    /// eight-digit valid calendar date.
    pub fn parse(s: &str) -> Result<Self, DomainError> {
        NaiveDate::parse_from_str(s, Self::FORMAT)
            .map(Self)
            .map_err(|_| DomainError::InvalidTradeDate(s.to_string()))
    }

    /// Wrap an already-validated date
    pub fn from_date(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Underlying calendar date
    pub fn as_date(&self) -> NaiveDate {
        self.0
    }

    /// Render as `YYYYMMDD`
    pub fn as_yyyymmdd(&self) -> String {
        self.0.format(Self::FORMAT).to_string()
    }
}

impl fmt::Display for TradeDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_yyyymmdd())
    }
}

// Wire format is YYYYMMDD on both topics and the gateway body, so the serde
// representation matches the parser rather than chrono's ISO default.
impl Serialize for TradeDate {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_yyyymmdd())
    }
}

impl<'de> Deserialize<'de> for TradeDate {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        TradeDate::parse(&raw).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Side
// =============================================================================

/// Side of the parent order (and of the block aggregated from its fills).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy order
    Buy,
    /// Sell order
    Sell,
}

impl Side {
    /// Canonical wire spelling, also used in deterministic id derivation
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// SecurityType
// =============================================================================

/// Asset class of an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SecurityType {
    /// Cash equity
    Equity,
    /// Fixed income
    Bond,
    /// Swap
    Swap,
}

impl fmt::Display for SecurityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityType::Equity => write!(f, "EQUITY"),
            SecurityType::Bond => write!(f, "BOND"),
            SecurityType::Swap => write!(f, "SWAP"),
        }
    }
}

// =============================================================================
// SettleMethod
// =============================================================================

/// Settlement method for an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SettleMethod {
    /// Delivery versus payment
    Dvp,
    /// Free of payment
    Fop,
}

impl fmt::Display for SettleMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettleMethod::Dvp => write!(f, "DVP"),
            SettleMethod::Fop => write!(f, "FOP"),
        }
    }
}

// =============================================================================
// BlockStatus
// =============================================================================

/// Block trade lifecycle status.
///
/// `Open` is declared for the first-fill state but is transient in practice:
/// every aggregation pass upserts `ReadyToAllocate`, so the open-bucket
/// lookup accepts either. At most one block per
/// (instrument, side, trade date) group may be `Open` or `ReadyToAllocate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockStatus {
    /// Created on first fill, before any aggregation pass completes
    Open,
    /// Aggregates recomputed, eligible for allocation
    ReadyToAllocate,
    /// Allocations created and published
    Allocated,
    /// A constituent execution was busted
    Busted,
}

impl BlockStatus {
    /// True while the block still accepts fills into its aggregation bucket
    pub fn is_aggregating(&self) -> bool {
        matches!(self, BlockStatus::Open | BlockStatus::ReadyToAllocate)
    }
}

impl fmt::Display for BlockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockStatus::Open => write!(f, "OPEN"),
            BlockStatus::ReadyToAllocate => write!(f, "READY_TO_ALLOCATE"),
            BlockStatus::Allocated => write!(f, "ALLOCATED"),
            BlockStatus::Busted => write!(f, "BUSTED"),
        }
    }
}

// =============================================================================
// Money rounding
// =============================================================================

/// Round a monetary amount to the given currency scale, half-even.
///
/// Used for `cashAmount = qty × price` and for block average prices.
pub fn round_money(value: Decimal, scale: u32) -> Decimal {
    value.round_dp_with_strategy(scale, RoundingStrategy::MidpointNearestEven)
}

/// Currency scale table.
///
/// Maps ISO currency codes to their minor-unit scale. Sourced from
/// configuration; the defaults cover the desk's settlement currencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyScales {
    scales: std::collections::HashMap<String, u32>,
}

impl CurrencyScales {
    /// Build from explicit (currency, scale) pairs
    pub fn new(pairs: impl IntoIterator<Item = (String, u32)>) -> Self {
        Self { scales: pairs.into_iter().collect() }
    }

    /// Scale for a currency.
    ///
    /// # Errors
    /// Returns `DomainError::UnknownCurrency` if the currency has no entry.
    pub fn scale_of(&self, currency: &str) -> Result<u32, DomainError> {
        self.scales
            .get(currency)
            .copied()
            .ok_or_else(|| DomainError::UnknownCurrency(currency.to_string()))
    }
}

impl Default for CurrencyScales {
    fn default() -> Self {
        Self::new([
            ("USD".to_string(), 2),
            ("EUR".to_string(), 2),
            ("GBP".to_string(), 2),
            ("CHF".to_string(), 2),
            ("JPY".to_string(), 0),
        ])
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_price_validation() {
        assert!(Price::new(dec!(10.00)).is_ok());
        assert!(Price::new(dec!(0.01)).is_ok());
        assert!(Price::new(dec!(0)).is_err());
        assert!(Price::new(dec!(-1)).is_err());
    }

    #[test]
    fn test_quantity_allows_zero() {
        assert!(Quantity::new(dec!(100)).is_ok());
        assert!(Quantity::new(dec!(0)).is_ok());
        assert!(Quantity::new(dec!(-1)).is_err());
        assert!(!Quantity::zero().is_positive());
        assert!(Quantity::new(dec!(0.5)).unwrap().is_positive());
    }

    #[test]
    fn test_trade_date_roundtrip() {
        let d = TradeDate::parse("20240115").unwrap();
        assert_eq!(d.as_yyyymmdd(), "20240115");
        assert_eq!(d.to_string(), "20240115");
    }

    #[test]
    fn test_trade_date_serde_uses_wire_format() {
        let d = TradeDate::parse("20240115").unwrap();
        assert_eq!(serde_json::to_string(&d).unwrap(), "\"20240115\"");
        let parsed: TradeDate = serde_json::from_str("\"20240115\"").unwrap();
        assert_eq!(parsed, d);
        assert!(serde_json::from_str::<TradeDate>("\"2024-01-15\"").is_err());
    }

    #[test]
    fn test_trade_date_rejects_garbage() {
        assert!(TradeDate::parse("2024-01-15").is_err());
        assert!(TradeDate::parse("20240231").is_err());
        assert!(TradeDate::parse("").is_err());
    }

    #[test]
    fn test_side_wire_spelling() {
        assert_eq!(Side::Buy.as_str(), "BUY");
        assert_eq!(serde_json::to_string(&Side::Sell).unwrap(), "\"SELL\"");
        let parsed: Side = serde_json::from_str("\"BUY\"").unwrap();
        assert_eq!(parsed, Side::Buy);
    }

    #[test]
    fn test_block_status_serde_format() {
        assert_eq!(
            serde_json::to_string(&BlockStatus::ReadyToAllocate).unwrap(),
            "\"READY_TO_ALLOCATE\""
        );
        assert!(BlockStatus::Open.is_aggregating());
        assert!(BlockStatus::ReadyToAllocate.is_aggregating());
        assert!(!BlockStatus::Allocated.is_aggregating());
        assert!(!BlockStatus::Busted.is_aggregating());
    }

    #[test]
    fn test_round_money_half_even() {
        // Ties round to the even neighbor
        assert_eq!(round_money(dec!(1.005), 2), dec!(1.00));
        assert_eq!(round_money(dec!(1.015), 2), dec!(1.02));
        assert_eq!(round_money(dec!(1.025), 2), dec!(1.02));
        // Non-ties round normally
        assert_eq!(round_money(dec!(10.401), 2), dec!(10.40));
        assert_eq!(round_money(dec!(10.406), 2), dec!(10.41));
        // JPY-style zero scale
        assert_eq!(round_money(dec!(1000.4), 0), dec!(1000));
    }

    #[test]
    fn test_currency_scales() {
        let scales = CurrencyScales::default();
        assert_eq!(scales.scale_of("USD").unwrap(), 2);
        assert_eq!(scales.scale_of("JPY").unwrap(), 0);
        assert!(scales.scale_of("XAU").is_err());
    }
}
