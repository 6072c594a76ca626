//! Inventory management: floor-checked stock adjustment and SKU assignment.
//!
//! Stock moves in two ways: standalone corrections through
//! [`InventoryService::adjust_stock`], and as a step inside the order
//! workflow's transaction through [`deduct_stock`]/[`restore_stock`], which
//! take the ambient transaction instead of opening their own.

use crate::audit::{record_best_effort, AuditEntry, AuditKind, AuditLog};
use crate::auth::AuthContext;
use crate::config::CoreConfig;
use crate::document::DocumentId;
use crate::errors::{CoreError, CoreResult, ValidationError};
use crate::model::{NewProduct, Product};
use crate::query::{Filter, PageRequest, SortOrder};
use crate::repository::{Entity, Repository};
use crate::retry::execute_with_retry;
use crate::store::DocumentStore;
use crate::transaction::Transaction;
use crate::types::{ProductId, Quantity, Sku, StockLevel, Timestamp};
use std::sync::Arc;
use tracing::info;

/// Attempts at deriving a unique SKU before giving up.
const MAX_SKU_ATTEMPTS: u64 = 5;

/// Removes units from a product's stock inside the caller's transaction.
///
/// Fails with `NotFound` when the product is missing and
/// `InsufficientStock` when fewer units are on hand than requested; the
/// floor is never clamped. Returns the product as staged, so callers can
/// snapshot its price in the same transaction.
pub async fn deduct_stock(
    txn: &mut Transaction,
    product_id: &ProductId,
    quantity: Quantity,
) -> CoreResult<Product> {
    let mut product: Product = txn
        .fetch_required(&DocumentId::from_display(product_id))
        .await?;
    let available = u64::from(product.stock.value());
    let remaining = product.stock.checked_sub(quantity).ok_or_else(|| {
        CoreError::InsufficientStock {
            product_id: product_id.clone(),
            requested: u64::from(quantity.value()),
            available,
        }
    })?;
    product.stock = remaining;
    product.updated_at = Timestamp::now();
    txn.update(&product)?;
    Ok(product)
}

/// Returns units to a product's stock inside the caller's transaction.
///
/// Used by order cancellation to undo the decrement made at creation.
pub async fn restore_stock(
    txn: &mut Transaction,
    product_id: &ProductId,
    quantity: Quantity,
) -> CoreResult<Product> {
    let mut product: Product = txn
        .fetch_required(&DocumentId::from_display(product_id))
        .await?;
    product.stock = product.stock.checked_add(quantity)?;
    product.updated_at = Timestamp::now();
    txn.update(&product)?;
    Ok(product)
}

/// Atomic, floor-checked stock adjustment and product/SKU creation.
pub struct InventoryService {
    store: Arc<dyn DocumentStore>,
    products: Repository<Product>,
    audit: Arc<dyn AuditLog>,
    auth: Arc<dyn AuthContext>,
    config: CoreConfig,
}

impl InventoryService {
    /// Creates the service over the given store and collaborators.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        audit: Arc<dyn AuditLog>,
        auth: Arc<dyn AuthContext>,
        config: CoreConfig,
    ) -> Self {
        let products = Repository::new(Arc::clone(&store));
        Self {
            store,
            products,
            audit,
            auth,
            config,
        }
    }

    /// Creates a product, deriving a unique SKU from its name.
    ///
    /// The SKU suffix starts at the collection count and advances past
    /// collisions, which the store's unique index reports as `Duplicate`.
    pub async fn create_product(&self, new_product: NewProduct) -> CoreResult<Product> {
        let mut attempt: u64 = 0;
        loop {
            let sequence = self.products.count(&Filter::new()).await? + 1 + attempt;
            let sku = Sku::derive_from_name(&new_product.name, sequence);
            let product = Product::new(
                ProductId::generate(),
                sku,
                new_product.name.clone(),
                new_product.description.clone(),
                new_product.price,
                new_product.initial_stock,
            );
            match self.products.create(&product).await {
                Ok(_) => {
                    info!(product_id = %product.id, sku = %product.sku, "product created");
                    record_best_effort(
                        self.audit.as_ref(),
                        AuditEntry::new(
                            self.auth.current_user(),
                            AuditKind::ProductCreated,
                            product.id.to_string(),
                            format!("sku {}", product.sku),
                        ),
                    )
                    .await;
                    return Ok(product);
                }
                Err(CoreError::Duplicate { .. }) if attempt + 1 < MAX_SKU_ATTEMPTS => {
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Adjusts a product's stock by a signed delta.
    ///
    /// Reads current stock, computes `stock + delta`, fails with
    /// `InsufficientStock` when the result would be negative, and persists
    /// the new level with an update timestamp. Retries internally on
    /// concurrency conflicts.
    pub async fn adjust_stock(&self, product_id: &ProductId, delta: i64) -> CoreResult<Product> {
        let product = execute_with_retry(&self.config.retry, || {
            self.try_adjust_stock(product_id, delta)
        })
        .await?;
        info!(product_id = %product.id, delta, stock = %product.stock, "stock adjusted");
        record_best_effort(
            self.audit.as_ref(),
            AuditEntry::new(
                self.auth.current_user(),
                AuditKind::StockAdjusted,
                product.id.to_string(),
                format!("delta {delta}, stock {}", product.stock),
            ),
        )
        .await;
        Ok(product)
    }

    async fn try_adjust_stock(&self, product_id: &ProductId, delta: i64) -> CoreResult<Product> {
        let mut txn = Transaction::begin(Arc::clone(&self.store));
        let mut product: Product = txn
            .fetch_required(&DocumentId::from_display(product_id))
            .await?;

        let current = i64::from(product.stock.value());
        let next = current.checked_add(delta).ok_or_else(|| {
            CoreError::Validation(ValidationError::OutOfRange(
                "stock adjustment overflows".to_string(),
            ))
        })?;
        if next < 0 {
            return Err(CoreError::InsufficientStock {
                product_id: product_id.clone(),
                requested: delta.unsigned_abs(),
                available: u64::from(product.stock.value()),
            });
        }
        let next = u32::try_from(next).map_err(|_| {
            CoreError::Validation(ValidationError::OutOfRange(format!(
                "stock {next} exceeds maximum level"
            )))
        })?;

        product.stock = StockLevel::new(next);
        product.updated_at = Timestamp::now();
        txn.update(&product)?;
        txn.commit().await?;
        Ok(product)
    }

    /// Reads a product by id.
    pub async fn get_product(&self, product_id: &ProductId) -> CoreResult<Product> {
        let id = DocumentId::from_display(product_id);
        self.products
            .find_by_id(&id)
            .await?
            .ok_or_else(|| CoreError::not_found(Product::collection(), id))
    }

    /// Lists products, newest first.
    pub async fn products_page(&self, page: PageRequest) -> CoreResult<Vec<Product>> {
        self.products
            .find(
                &Filter::new(),
                &page.options_sorted("created_at", SortOrder::Descending),
            )
            .await
    }
}
