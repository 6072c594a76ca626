//! Order fulfillment workflow.
//!
//! Creation validates items against current stock and price, freezes the
//! total, and decrements stock in the same transaction that persists the
//! order. Cancellation restores stock and moves the order to `Cancelled`
//! atomically. Field updates (status progression, payment status, tracking,
//! address) run in a transaction for atomicity with their timestamp side
//! effects but never touch inventory.
//!
//! No step of a multi-step operation is ever partially applied: any failure
//! aborts the whole transaction, and a lost optimistic race is retried
//! against fresh state.

use crate::audit::{record_best_effort, AuditEntry, AuditKind, AuditLog};
use crate::auth::AuthContext;
use crate::config::CoreConfig;
use crate::document::DocumentId;
use crate::errors::{CoreError, CoreResult, ValidationError};
use crate::inventory;
use crate::model::{NewOrderItem, Order, OrderItem, OrderPatch, OrderStatus};
use crate::query::{Filter, PageRequest, SortOrder};
use crate::repository::{Entity, Repository};
use crate::retry::execute_with_retry;
use crate::store::DocumentStore;
use crate::transaction::Transaction;
use crate::types::{OrderId, Timestamp, UserId};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// The order fulfillment workflow service.
pub struct OrderService {
    store: Arc<dyn DocumentStore>,
    orders: Repository<Order>,
    audit: Arc<dyn AuditLog>,
    auth: Arc<dyn AuthContext>,
    config: CoreConfig,
}

impl OrderService {
    /// Creates the service over the given store and collaborators.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        audit: Arc<dyn AuditLog>,
        auth: Arc<dyn AuthContext>,
        config: CoreConfig,
    ) -> Self {
        let orders = Repository::new(Arc::clone(&store));
        Self {
            store,
            orders,
            audit,
            auth,
            config,
        }
    }

    /// Creates an order for a user.
    ///
    /// For each item the current product is read, stock is checked and
    /// decremented, and the unit price is snapshotted; the total is the sum
    /// of quantity × snapshotted price. The order insert and every stock
    /// decrement commit atomically - on any failure nothing is applied.
    pub async fn create_order(
        &self,
        user_id: &UserId,
        items: &[NewOrderItem],
    ) -> CoreResult<Order> {
        Self::validate_items(items)?;
        let order = execute_with_retry(&self.config.retry, || {
            self.try_create_order(user_id, items)
        })
        .await?;
        info!(
            order_id = %order.id,
            user_id = %order.user_id,
            total = %order.total,
            "order created"
        );
        record_best_effort(
            self.audit.as_ref(),
            AuditEntry::new(
                self.auth.current_user(),
                AuditKind::OrderCreated,
                order.id.to_string(),
                format!("{} line(s), total {}", order.items.len(), order.total),
            ),
        )
        .await;
        Ok(order)
    }

    /// Cancels an order, restoring the stock of every line item.
    ///
    /// Legal only while the order is `Pending` or `Processing`. Restoration
    /// and the status change commit atomically.
    pub async fn cancel_order(&self, order_id: &OrderId) -> CoreResult<Order> {
        let order =
            execute_with_retry(&self.config.retry, || self.try_cancel_order(order_id)).await?;
        info!(order_id = %order.id, "order cancelled");
        record_best_effort(
            self.audit.as_ref(),
            AuditEntry::new(
                self.auth.current_user(),
                AuditKind::OrderCancelled,
                order.id.to_string(),
                format!("{} line(s) restocked", order.items.len()),
            ),
        )
        .await;
        Ok(order)
    }

    /// Applies non-stock-affecting field changes to an order.
    ///
    /// Status changes must follow the forward transition table; cancellation
    /// is rejected here and must go through [`OrderService::cancel_order`].
    /// Lifecycle timestamps (`shipped_at`, `delivered_at`) are set in the
    /// same transaction as the status change.
    pub async fn update_order(&self, order_id: &OrderId, patch: &OrderPatch) -> CoreResult<Order> {
        if patch.is_empty() {
            return Err(CoreError::Validation(ValidationError::Custom(
                "order patch must change at least one field".to_string(),
            )));
        }
        let order = execute_with_retry(&self.config.retry, || {
            self.try_update_order(order_id, patch)
        })
        .await?;
        info!(
            order_id = %order.id,
            status = %order.status,
            payment_status = %order.payment_status,
            "order updated"
        );
        record_best_effort(
            self.audit.as_ref(),
            AuditEntry::new(
                self.auth.current_user(),
                AuditKind::OrderUpdated,
                order.id.to_string(),
                format!("status {}, payment {}", order.status, order.payment_status),
            ),
        )
        .await;
        Ok(order)
    }

    /// Progresses an order's status.
    pub async fn update_order_status(
        &self,
        order_id: &OrderId,
        status: OrderStatus,
    ) -> CoreResult<Order> {
        self.update_order(order_id, &OrderPatch::new().with_status(status))
            .await
    }

    /// Reads an order by id.
    pub async fn get_order(&self, order_id: &OrderId) -> CoreResult<Order> {
        let id = DocumentId::from_display(order_id);
        self.orders
            .find_by_id(&id)
            .await?
            .ok_or_else(|| CoreError::not_found(Order::collection(), id))
    }

    /// Lists a user's orders, newest first.
    pub async fn orders_for_user(
        &self,
        user_id: &UserId,
        page: PageRequest,
    ) -> CoreResult<Vec<Order>> {
        let filter = Filter::new().field_eq("user_id", user_id.to_string());
        self.orders
            .find(
                &filter,
                &page.options_sorted("created_at", SortOrder::Descending),
            )
            .await
    }

    /// Lists orders in a given status, newest first.
    pub async fn orders_with_status(
        &self,
        status: OrderStatus,
        page: PageRequest,
    ) -> CoreResult<Vec<Order>> {
        let filter = Filter::new().field_eq("status", status.to_string());
        self.orders
            .find(
                &filter,
                &page.options_sorted("created_at", SortOrder::Descending),
            )
            .await
    }

    /// Rejected before any transaction opens.
    fn validate_items(items: &[NewOrderItem]) -> CoreResult<()> {
        if items.is_empty() {
            return Err(CoreError::Validation(ValidationError::Custom(
                "order must contain at least one item".to_string(),
            )));
        }
        let mut seen = HashSet::new();
        for item in items {
            if !seen.insert(&item.product_id) {
                return Err(CoreError::Validation(ValidationError::Custom(format!(
                    "duplicate product in order: {}",
                    item.product_id
                ))));
            }
        }
        Ok(())
    }

    async fn try_create_order(
        &self,
        user_id: &UserId,
        items: &[NewOrderItem],
    ) -> CoreResult<Order> {
        let mut txn = Transaction::begin(Arc::clone(&self.store));

        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            let product = inventory::deduct_stock(&mut txn, &item.product_id, item.quantity).await?;
            lines.push(OrderItem::new(
                item.product_id.clone(),
                item.quantity,
                product.price,
            ));
        }

        let total = Order::compute_total(&lines)?;
        let order = Order::new(OrderId::generate(), user_id.clone(), lines, total);
        txn.insert(&order)?;
        txn.commit().await?;
        Ok(order)
    }

    async fn try_cancel_order(&self, order_id: &OrderId) -> CoreResult<Order> {
        let mut txn = Transaction::begin(Arc::clone(&self.store));

        let mut order: Order = txn
            .fetch_required(&DocumentId::from_display(order_id))
            .await?;
        if !order.status.can_cancel() {
            return Err(CoreError::InvalidStateTransition {
                from: order.status,
                to: OrderStatus::Cancelled,
            });
        }

        for item in &order.items {
            inventory::restore_stock(&mut txn, &item.product_id, item.quantity).await?;
        }

        order.status = OrderStatus::Cancelled;
        order.cancelled_at = Some(Timestamp::now());
        txn.update(&order)?;
        txn.commit().await?;
        Ok(order)
    }

    async fn try_update_order(&self, order_id: &OrderId, patch: &OrderPatch) -> CoreResult<Order> {
        let mut txn = Transaction::begin(Arc::clone(&self.store));

        let mut order: Order = txn
            .fetch_required(&DocumentId::from_display(order_id))
            .await?;

        if let Some(next) = patch.status {
            if next == OrderStatus::Cancelled || !order.status.can_transition_to(next) {
                return Err(CoreError::InvalidStateTransition {
                    from: order.status,
                    to: next,
                });
            }
            order.status = next;
            match next {
                OrderStatus::Shipped => order.shipped_at = Some(Timestamp::now()),
                OrderStatus::Delivered => order.delivered_at = Some(Timestamp::now()),
                _ => {}
            }
        }
        if let Some(payment_status) = patch.payment_status {
            order.payment_status = payment_status;
        }
        if let Some(tracking_number) = &patch.tracking_number {
            order.tracking_number = Some(tracking_number.clone());
        }
        if let Some(shipping_address) = &patch.shipping_address {
            order.shipping_address = Some(shipping_address.clone());
        }

        txn.update(&order)?;
        txn.commit().await?;
        Ok(order)
    }
}
