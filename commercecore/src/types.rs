//! Core validated types for the `CommerceCore` library.
//!
//! All types use smart constructors so that validity is established at
//! construction time, following the "parse, don't validate" principle.
//! Once a value exists it is guaranteed valid everywhere it flows.

use crate::errors::ValidationError;
use chrono::{DateTime, Utc};
use nutype::nutype;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use uuid::Uuid;

/// Product identifier.
///
/// Format: PRD-{UPPERCASE_ALPHANUMERIC}, e.g. `PRD-A1B2C3D4`.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 50, regex = r"^PRD-[A-Z0-9]+$"),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Display,
        AsRef,
        Deref,
        Serialize,
        Deserialize,
        TryFrom
    )
)]
pub struct ProductId(String);

impl ProductId {
    /// Generate a new product id with a UUIDv7-derived suffix.
    pub fn generate() -> Self {
        let uuid = Uuid::now_v7().simple().to_string().to_uppercase();
        Self::try_new(format!("PRD-{}", &uuid[..8])).expect("Generated ProductId should be valid")
    }
}

/// Order identifier.
///
/// Format: ORD-{UPPERCASE_ALPHANUMERIC}, e.g. `ORD-A1B2C3D4`.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 50, regex = r"^ORD-[A-Z0-9]+$"),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Display,
        AsRef,
        Deref,
        Serialize,
        Deserialize,
        TryFrom
    )
)]
pub struct OrderId(String);

impl OrderId {
    /// Generate a new order id with a UUIDv7-derived suffix.
    pub fn generate() -> Self {
        let uuid = Uuid::now_v7().simple().to_string().to_uppercase();
        Self::try_new(format!("ORD-{}", &uuid[..8])).expect("Generated OrderId should be valid")
    }
}

/// Review identifier.
///
/// Format: REV-{UPPERCASE_ALPHANUMERIC}.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 50, regex = r"^REV-[A-Z0-9]+$"),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Display,
        AsRef,
        Deref,
        Serialize,
        Deserialize,
        TryFrom
    )
)]
pub struct ReviewId(String);

impl ReviewId {
    /// Generate a new review id with a UUIDv7-derived suffix.
    pub fn generate() -> Self {
        let uuid = Uuid::now_v7().simple().to_string().to_uppercase();
        Self::try_new(format!("REV-{}", &uuid[..8])).expect("Generated ReviewId should be valid")
    }
}

/// User identifier supplied by the authentication layer.
///
/// Format: USR-{UPPERCASE_ALPHANUMERIC}.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 50, regex = r"^USR-[A-Z0-9]+$"),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Display,
        AsRef,
        Deref,
        Serialize,
        Deserialize,
        TryFrom
    )
)]
pub struct UserId(String);

impl UserId {
    /// Generate a new user id with a UUIDv7-derived suffix.
    pub fn generate() -> Self {
        let uuid = Uuid::now_v7().simple().to_string().to_uppercase();
        Self::try_new(format!("USR-{}", &uuid[..8])).expect("Generated UserId should be valid")
    }
}

/// Stock keeping unit with validation.
///
/// Uppercase alphanumeric with hyphens, at most 20 characters.
/// Uniqueness is enforced by a store-level index, not by this type.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 20, regex = r"^[A-Z0-9-]+$"),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Display,
        AsRef,
        Deref,
        Serialize,
        Deserialize,
        TryFrom
    )
)]
pub struct Sku(String);

impl Sku {
    /// Derive a SKU from a product name and a sequence number.
    ///
    /// The prefix is the first three alphabetic characters of the name,
    /// uppercased and padded with `X`; the suffix is the zero-padded
    /// sequence number. The suffix wraps to keep within SKU length.
    pub fn derive_from_name(name: &ProductName, sequence: u64) -> Self {
        let mut prefix: String = name
            .as_ref()
            .chars()
            .filter(char::is_ascii_alphabetic)
            .take(3)
            .collect::<String>()
            .to_ascii_uppercase();
        while prefix.len() < 3 {
            prefix.push('X');
        }
        let suffix = sequence % 1_000_000;
        Self::try_new(format!("{prefix}-{suffix:04}")).expect("Derived SKU should be valid")
    }
}

/// Product name with validation.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 100),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Display,
        AsRef,
        Deref,
        Serialize,
        Deserialize,
        TryFrom
    )
)]
pub struct ProductName(String);

/// Review comment text, trimmed and bounded. May be empty.
#[nutype(
    sanitize(trim),
    validate(len_char_max = 2000),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Display,
        AsRef,
        Deref,
        Serialize,
        Deserialize,
        TryFrom
    )
)]
pub struct ReviewComment(String);

/// Review rating, an integer from 1 to 5 inclusive.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 5),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Display,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct ReviewRating(u8);

impl ReviewRating {
    /// The rating as a float, for aggregate arithmetic.
    pub fn as_f64(self) -> f64 {
        f64::from(self.into_inner())
    }
}

/// Document revision for optimistic concurrency control.
///
/// A missing document has revision 0; the first committed write produces
/// revision 1, and every subsequent write increments it.
#[nutype(
    validate(greater_or_equal = 0),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Display,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct Revision(u64);

impl Revision {
    /// The revision of a document that does not exist yet.
    pub fn initial() -> Self {
        Self::try_new(0).expect("0 is always a valid revision")
    }

    /// Returns the next revision after this one.
    #[must_use]
    pub fn next(self) -> Self {
        let current: u64 = self.into();
        Self::try_new(current + 1).expect("next revision should always be valid")
    }
}

/// Product quantity on an order line item.
///
/// Must be positive, maximum 1000 per line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Quantity(u32);

impl Quantity {
    /// Maximum quantity per order line item.
    pub const MAX_QUANTITY: u32 = 1000;

    /// Create a new quantity.
    pub fn new(value: u32) -> Result<Self, ValidationError> {
        if value == 0 {
            return Err(ValidationError::OutOfRange(
                "Quantity must be greater than 0".to_string(),
            ));
        }
        if value > Self::MAX_QUANTITY {
            return Err(ValidationError::OutOfRange(format!(
                "Quantity {} exceeds maximum {}",
                value,
                Self::MAX_QUANTITY
            )));
        }
        Ok(Self(value))
    }

    /// Get the underlying value.
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sellable units on hand for a product. Floor of zero.
///
/// The floor is a workflow error (`InsufficientStock`), never a clamp; this
/// type only offers checked arithmetic.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct StockLevel(u32);

impl StockLevel {
    /// Create a stock level.
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Get the underlying unit count.
    pub const fn value(self) -> u32 {
        self.0
    }

    /// True when no units are on hand.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Add units, checking for overflow.
    pub fn checked_add(self, quantity: Quantity) -> Result<Self, ValidationError> {
        self.0
            .checked_add(quantity.value())
            .map(Self)
            .ok_or_else(|| ValidationError::OutOfRange("Stock level overflow".to_string()))
    }

    /// Remove units; `None` when fewer units are on hand than requested.
    pub fn checked_sub(self, quantity: Quantity) -> Option<Self> {
        self.0.checked_sub(quantity.value()).map(Self)
    }
}

impl Display for StockLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Money amount with validation.
///
/// Uses `Decimal` for precise financial calculations.
/// Must be non-negative with at most 2 decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(Decimal);

impl Money {
    /// Maximum money amount (100 million).
    pub const MAX_AMOUNT: Decimal = Decimal::from_parts(100_000_000, 0, 0, false, 0);

    /// Create money from cents (avoids floating point issues).
    pub fn from_cents(cents: u64) -> Result<Self, ValidationError> {
        let decimal = Decimal::new(cents as i64, 2);
        Self::new(decimal)
    }

    /// Create money from a decimal amount.
    pub fn new(amount: Decimal) -> Result<Self, ValidationError> {
        if amount.is_sign_negative() {
            return Err(ValidationError::OutOfRange(format!(
                "Money amount cannot be negative: {amount}"
            )));
        }
        if amount.scale() > 2 {
            return Err(ValidationError::InvalidFormat(format!(
                "Money amount cannot have more than 2 decimal places: {amount}"
            )));
        }
        if amount > Self::MAX_AMOUNT {
            return Err(ValidationError::OutOfRange(format!(
                "Money amount {} exceeds maximum {}",
                amount,
                Self::MAX_AMOUNT
            )));
        }
        Ok(Self(amount))
    }

    /// Zero money.
    pub fn zero() -> Self {
        Self(Decimal::new(0, 0))
    }

    /// Get the underlying decimal value.
    pub fn amount(self) -> Decimal {
        self.0
    }

    /// Convert to cents for assertions and storage.
    pub fn to_cents(self) -> u64 {
        (self.0 * Decimal::from(100)).to_u64().unwrap_or(0)
    }

    /// Add money amounts, staying within range.
    pub fn checked_add(self, other: Self) -> Result<Self, ValidationError> {
        Self::new(self.0 + other.0)
    }

    /// Multiply by an order quantity.
    pub fn multiply_by_quantity(self, quantity: Quantity) -> Result<Self, ValidationError> {
        Self::new(self.0 * Decimal::from(quantity.value()))
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${:.2}", self.0)
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

/// A timestamp for lifecycle events.
///
/// Wrapper over UTC `DateTime` for consistent handling throughout the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a new timestamp from a UTC `DateTime`.
    pub const fn new(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }

    /// Creates a timestamp representing the current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns the underlying `DateTime`.
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Converts the timestamp into the underlying `DateTime`.
    pub const fn into_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(datetime: DateTime<Utc>) -> Self {
        Self::new(datetime)
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(timestamp: Timestamp) -> Self {
        timestamp.into_datetime()
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

// Conversions from nutype constructor errors into the shared validation error.

impl From<ProductIdError> for ValidationError {
    fn from(err: ProductIdError) -> Self {
        Self::InvalidFormat(err.to_string())
    }
}

impl From<OrderIdError> for ValidationError {
    fn from(err: OrderIdError) -> Self {
        Self::InvalidFormat(err.to_string())
    }
}

impl From<ReviewIdError> for ValidationError {
    fn from(err: ReviewIdError) -> Self {
        Self::InvalidFormat(err.to_string())
    }
}

impl From<UserIdError> for ValidationError {
    fn from(err: UserIdError) -> Self {
        Self::InvalidFormat(err.to_string())
    }
}

impl From<SkuError> for ValidationError {
    fn from(err: SkuError) -> Self {
        Self::InvalidFormat(err.to_string())
    }
}

impl From<ProductNameError> for ValidationError {
    fn from(err: ProductNameError) -> Self {
        Self::InvalidFormat(err.to_string())
    }
}

impl From<ReviewCommentError> for ValidationError {
    fn from(err: ReviewCommentError) -> Self {
        Self::InvalidFormat(err.to_string())
    }
}

impl From<ReviewRatingError> for ValidationError {
    fn from(err: ReviewRatingError) -> Self {
        Self::OutOfRange(err.to_string())
    }
}
