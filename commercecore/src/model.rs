//! Domain entities: products, orders, and reviews.
//!
//! Entities are plain serde-serializable records; every invariant that
//! spans more than one field or more than one entity is enforced by the
//! workflow services, inside a transaction.

use crate::document::{CollectionName, DocumentId, UniqueIndex};
use crate::errors::ValidationError;
use crate::repository::Entity;
use crate::types::{
    Money, OrderId, ProductId, ProductName, Quantity, ReviewComment, ReviewId, ReviewRating, Sku,
    StockLevel, Timestamp, UserId,
};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// A catalog product.
///
/// `stock` is mutated by the inventory manager, `rating`/`review_count` by
/// the rating aggregator; both only ever inside a transaction that also
/// persists the causally related record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Unique product identifier
    pub id: ProductId,
    /// Unique stock keeping unit
    pub sku: Sku,
    /// Display name
    pub name: ProductName,
    /// Optional description
    pub description: Option<String>,
    /// Current price; historical orders keep their purchase-time price
    pub price: Money,
    /// Sellable units on hand
    pub stock: StockLevel,
    /// Mean of all current review ratings, 0.0 when unreviewed
    pub rating: f64,
    /// Number of current reviews
    pub review_count: u64,
    /// Creation time
    pub created_at: Timestamp,
    /// Last mutation time
    pub updated_at: Timestamp,
}

impl Product {
    /// Creates a product with no reviews.
    pub fn new(
        id: ProductId,
        sku: Sku,
        name: ProductName,
        description: Option<String>,
        price: Money,
        stock: StockLevel,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            id,
            sku,
            name,
            description,
            price,
            stock,
            rating: 0.0,
            review_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Entity for Product {
    fn collection() -> CollectionName {
        CollectionName::try_new("products").expect("'products' is a valid collection name")
    }

    fn document_id(&self) -> DocumentId {
        DocumentId::from_display(&self.id)
    }
}

/// Input for creating a product. The SKU is assigned by the inventory
/// manager, not supplied by the caller.
#[derive(Debug, Clone)]
pub struct NewProduct {
    /// Display name; also the source of the SKU prefix
    pub name: ProductName,
    /// Optional description
    pub description: Option<String>,
    /// Initial price
    pub price: Money,
    /// Initial units on hand
    pub initial_stock: StockLevel,
}

/// Lifecycle status of an order.
///
/// Progression is monotonic forward through
/// pending → processing → shipped → delivered; `Cancelled` is reachable only
/// from `Pending` or `Processing`. `Delivered` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order accepted, payment not yet processed
    Pending,
    /// Order being prepared
    Processing,
    /// Order handed to the carrier
    Shipped,
    /// Order received by the customer
    Delivered,
    /// Order cancelled, stock restored
    Cancelled,
}

impl OrderStatus {
    /// Whether a forward progression to `next` is legal.
    ///
    /// Cancellation is not a progression; see [`OrderStatus::can_cancel`].
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Shipped)
                | (Self::Shipped, Self::Delivered)
        )
    }

    /// Whether cancellation is legal from this status.
    pub fn can_cancel(self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }

    /// Whether no further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        };
        f.write_str(status)
    }
}

/// Payment state of an order, tracked independently of fulfillment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Awaiting payment
    Pending,
    /// Payment captured
    Paid,
    /// Payment attempt failed
    Failed,
    /// Payment returned to the customer
    Refunded,
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        };
        f.write_str(status)
    }
}

/// One line of an order, with the unit price frozen at purchase time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    /// The ordered product
    pub product_id: ProductId,
    /// Units ordered
    pub quantity: Quantity,
    /// Unit price snapshotted when the order was created
    pub unit_price_at_purchase: Money,
}

impl OrderItem {
    /// Creates an order line.
    pub const fn new(product_id: ProductId, quantity: Quantity, unit_price_at_purchase: Money) -> Self {
        Self {
            product_id,
            quantity,
            unit_price_at_purchase,
        }
    }

    /// The line total: quantity × unit price at purchase.
    pub fn line_total(&self) -> Result<Money, ValidationError> {
        self.unit_price_at_purchase
            .multiply_by_quantity(self.quantity)
    }
}

/// A requested order line, before price snapshotting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    /// The product to order
    pub product_id: ProductId,
    /// Units to order
    pub quantity: Quantity,
}

impl NewOrderItem {
    /// Creates a requested order line.
    pub const fn new(product_id: ProductId, quantity: Quantity) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// A customer order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Unique order identifier
    pub id: OrderId,
    /// The owning user
    pub user_id: UserId,
    /// Ordered line items
    pub items: Vec<OrderItem>,
    /// Total frozen at creation: Σ quantity × unit price at purchase
    pub total: Money,
    /// Fulfillment status
    pub status: OrderStatus,
    /// Payment status
    pub payment_status: PaymentStatus,
    /// Carrier tracking number, once shipped
    pub tracking_number: Option<String>,
    /// Destination address
    pub shipping_address: Option<String>,
    /// Creation time
    pub created_at: Timestamp,
    /// Set when the order transitions to `Shipped`
    pub shipped_at: Option<Timestamp>,
    /// Set when the order transitions to `Delivered`
    pub delivered_at: Option<Timestamp>,
    /// Set when the order is cancelled
    pub cancelled_at: Option<Timestamp>,
}

impl Order {
    /// Creates a pending order with the given pre-computed total.
    pub fn new(id: OrderId, user_id: UserId, items: Vec<OrderItem>, total: Money) -> Self {
        Self {
            id,
            user_id,
            items,
            total,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            tracking_number: None,
            shipping_address: None,
            created_at: Timestamp::now(),
            shipped_at: None,
            delivered_at: None,
            cancelled_at: None,
        }
    }

    /// Sums line totals with checked money arithmetic.
    pub fn compute_total(items: &[OrderItem]) -> Result<Money, ValidationError> {
        items.iter().try_fold(Money::zero(), |total, item| {
            total.checked_add(item.line_total()?)
        })
    }
}

impl Entity for Order {
    fn collection() -> CollectionName {
        CollectionName::try_new("orders").expect("'orders' is a valid collection name")
    }

    fn document_id(&self) -> DocumentId {
        DocumentId::from_display(&self.id)
    }
}

/// Non-stock-affecting order field changes.
///
/// Cancellation is deliberately not expressible here; it restores stock and
/// has its own operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderPatch {
    /// Forward status progression
    pub status: Option<OrderStatus>,
    /// Payment status change
    pub payment_status: Option<PaymentStatus>,
    /// Carrier tracking number
    pub tracking_number: Option<String>,
    /// Destination address
    pub shipping_address: Option<String>,
}

impl OrderPatch {
    /// An empty patch.
    pub const fn new() -> Self {
        Self {
            status: None,
            payment_status: None,
            tracking_number: None,
            shipping_address: None,
        }
    }

    /// Sets the target status.
    #[must_use]
    pub const fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the payment status.
    #[must_use]
    pub const fn with_payment_status(mut self, payment_status: PaymentStatus) -> Self {
        self.payment_status = Some(payment_status);
        self
    }

    /// Sets the tracking number.
    #[must_use]
    pub fn with_tracking_number(mut self, tracking_number: impl Into<String>) -> Self {
        self.tracking_number = Some(tracking_number.into());
        self
    }

    /// Sets the shipping address.
    #[must_use]
    pub fn with_shipping_address(mut self, shipping_address: impl Into<String>) -> Self {
        self.shipping_address = Some(shipping_address.into());
        self
    }

    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.payment_status.is_none()
            && self.tracking_number.is_none()
            && self.shipping_address.is_none()
    }
}

/// A product review. Exactly one per (user, product) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    /// Unique review identifier
    pub id: ReviewId,
    /// The reviewed product
    pub product_id: ProductId,
    /// The authoring user
    pub user_id: UserId,
    /// Rating, 1 to 5
    pub rating: ReviewRating,
    /// Comment text
    pub comment: ReviewComment,
    /// Creation time
    pub created_at: Timestamp,
    /// Last edit time
    pub updated_at: Timestamp,
}

impl Review {
    /// Creates a review.
    pub fn new(
        id: ReviewId,
        product_id: ProductId,
        user_id: UserId,
        rating: ReviewRating,
        comment: ReviewComment,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            id,
            product_id,
            user_id,
            rating,
            comment,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Entity for Review {
    fn collection() -> CollectionName {
        CollectionName::try_new("reviews").expect("'reviews' is a valid collection name")
    }

    fn document_id(&self) -> DocumentId {
        DocumentId::from_display(&self.id)
    }
}

/// Changes to a review's rating and/or comment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewPatch {
    /// New rating
    pub rating: Option<ReviewRating>,
    /// New comment
    pub comment: Option<ReviewComment>,
}

impl ReviewPatch {
    /// An empty patch.
    pub const fn new() -> Self {
        Self {
            rating: None,
            comment: None,
        }
    }

    /// Sets the rating.
    #[must_use]
    pub const fn with_rating(mut self, rating: ReviewRating) -> Self {
        self.rating = Some(rating);
        self
    }

    /// Sets the comment.
    #[must_use]
    pub fn with_comment(mut self, comment: ReviewComment) -> Self {
        self.comment = Some(comment);
        self
    }

    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.rating.is_none() && self.comment.is_none()
    }
}

/// The unique indexes the store must enforce for this domain: one SKU per
/// product, one review per (product, user) pair.
pub fn commerce_indexes() -> Vec<UniqueIndex> {
    vec![
        UniqueIndex::new(Product::collection(), &["sku"]),
        UniqueIndex::new(Review::collection(), &["product_id", "user_id"]),
    ]
}
