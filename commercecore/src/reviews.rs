//! Review lifecycle and incremental rating aggregation.
//!
//! A product's `rating` is the arithmetic mean of its current reviews and
//! `review_count` their count, maintained incrementally rather than by
//! rescanning all reviews. Every review mutation updates the owning product
//! in the same transaction, so the aggregate can never drift from the
//! reviews it summarizes.

use crate::audit::{record_best_effort, AuditEntry, AuditKind, AuditLog};
use crate::auth::AuthContext;
use crate::config::CoreConfig;
use crate::document::DocumentId;
use crate::errors::{CoreError, CoreResult, ValidationError};
use crate::model::{Product, Review, ReviewPatch};
use crate::query::{Filter, PageRequest, SortOrder};
use crate::repository::{Entity, Repository};
use crate::retry::execute_with_retry;
use crate::store::DocumentStore;
use crate::transaction::Transaction;
use crate::types::{ProductId, ReviewComment, ReviewId, ReviewRating, Timestamp, UserId};
use std::sync::Arc;
use tracing::info;

/// Aggregate after adding a review: the running mean absorbs one rating.
#[allow(clippy::cast_precision_loss)]
fn rating_after_create(average: f64, count: u64, new: ReviewRating) -> (f64, u64) {
    let new_count = count + 1;
    let average = (average * count as f64 + new.as_f64()) / new_count as f64;
    (average, new_count)
}

/// Aggregate after changing one review's rating; the count is unchanged.
#[allow(clippy::cast_precision_loss)]
fn rating_after_update(average: f64, count: u64, old: ReviewRating, new: ReviewRating) -> f64 {
    (average * count as f64 - old.as_f64() + new.as_f64()) / count as f64
}

/// Aggregate after removing a review. Deleting the last review resets the
/// rating to 0 - a documented product-level contract, not a mathematical
/// necessity.
#[allow(clippy::cast_precision_loss)]
fn rating_after_delete(average: f64, count: u64, removed: ReviewRating) -> (f64, u64) {
    if count <= 1 {
        return (0.0, 0);
    }
    let new_count = count - 1;
    let average = (average * count as f64 - removed.as_f64()) / new_count as f64;
    (average, new_count)
}

/// The review workflow service and rating aggregator.
pub struct ReviewService {
    store: Arc<dyn DocumentStore>,
    reviews: Repository<Review>,
    audit: Arc<dyn AuditLog>,
    auth: Arc<dyn AuthContext>,
    config: CoreConfig,
}

impl ReviewService {
    /// Creates the service over the given store and collaborators.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        audit: Arc<dyn AuditLog>,
        auth: Arc<dyn AuthContext>,
        config: CoreConfig,
    ) -> Self {
        let reviews = Repository::new(Arc::clone(&store));
        Self {
            store,
            reviews,
            audit,
            auth,
            config,
        }
    }

    /// Creates a review and folds its rating into the product's aggregate.
    ///
    /// At most one review per (user, product): a second one fails with
    /// `Duplicate`, checked in the transaction and enforced again by the
    /// store's unique index at commit.
    pub async fn create_review(
        &self,
        product_id: &ProductId,
        user_id: &UserId,
        rating: ReviewRating,
        comment: ReviewComment,
    ) -> CoreResult<Review> {
        let review = execute_with_retry(&self.config.retry, || {
            self.try_create_review(product_id, user_id, rating, comment.clone())
        })
        .await?;
        info!(
            review_id = %review.id,
            product_id = %review.product_id,
            rating = %review.rating,
            "review created"
        );
        record_best_effort(
            self.audit.as_ref(),
            AuditEntry::new(
                self.auth.current_user(),
                AuditKind::ReviewCreated,
                review.id.to_string(),
                format!("product {}, rating {}", review.product_id, review.rating),
            ),
        )
        .await;
        Ok(review)
    }

    /// Updates a review's rating and/or comment, recomputing the product
    /// aggregate in the same transaction when the rating changed.
    pub async fn update_review(
        &self,
        review_id: &ReviewId,
        patch: &ReviewPatch,
    ) -> CoreResult<Review> {
        if patch.is_empty() {
            return Err(CoreError::Validation(ValidationError::Custom(
                "review patch must change at least one field".to_string(),
            )));
        }
        let review = execute_with_retry(&self.config.retry, || {
            self.try_update_review(review_id, patch)
        })
        .await?;
        info!(review_id = %review.id, rating = %review.rating, "review updated");
        record_best_effort(
            self.audit.as_ref(),
            AuditEntry::new(
                self.auth.current_user(),
                AuditKind::ReviewUpdated,
                review.id.to_string(),
                format!("rating {}", review.rating),
            ),
        )
        .await;
        Ok(review)
    }

    /// Deletes a review and removes its contribution from the product
    /// aggregate atomically.
    pub async fn delete_review(&self, review_id: &ReviewId) -> CoreResult<()> {
        let review = execute_with_retry(&self.config.retry, || {
            self.try_delete_review(review_id)
        })
        .await?;
        info!(review_id = %review.id, product_id = %review.product_id, "review deleted");
        record_best_effort(
            self.audit.as_ref(),
            AuditEntry::new(
                self.auth.current_user(),
                AuditKind::ReviewDeleted,
                review.id.to_string(),
                format!("product {}", review.product_id),
            ),
        )
        .await;
        Ok(())
    }

    /// Reads a review by id.
    pub async fn get_review(&self, review_id: &ReviewId) -> CoreResult<Review> {
        let id = DocumentId::from_display(review_id);
        self.reviews
            .find_by_id(&id)
            .await?
            .ok_or_else(|| CoreError::not_found(Review::collection(), id))
    }

    /// Lists a product's reviews, newest first.
    pub async fn reviews_for_product(
        &self,
        product_id: &ProductId,
        page: PageRequest,
    ) -> CoreResult<Vec<Review>> {
        let filter = Filter::new().field_eq("product_id", product_id.to_string());
        self.reviews
            .find(
                &filter,
                &page.options_sorted("created_at", SortOrder::Descending),
            )
            .await
    }

    async fn try_create_review(
        &self,
        product_id: &ProductId,
        user_id: &UserId,
        rating: ReviewRating,
        comment: ReviewComment,
    ) -> CoreResult<Review> {
        let mut txn = Transaction::begin(Arc::clone(&self.store));

        let mut product: Product = txn
            .fetch_required(&DocumentId::from_display(product_id))
            .await?;

        let duplicate_filter = Filter::new()
            .field_eq("product_id", product_id.to_string())
            .field_eq("user_id", user_id.to_string());
        if txn.find_one::<Review>(&duplicate_filter).await?.is_some() {
            return Err(CoreError::Duplicate {
                constraint: "reviews.product_id,user_id".to_string(),
                value: format!("{product_id}/{user_id}"),
            });
        }

        let review = Review::new(
            ReviewId::generate(),
            product_id.clone(),
            user_id.clone(),
            rating,
            comment,
        );

        let (average, count) = rating_after_create(product.rating, product.review_count, rating);
        product.rating = average;
        product.review_count = count;
        product.updated_at = Timestamp::now();

        txn.insert(&review)?;
        txn.update(&product)?;
        txn.commit().await?;
        Ok(review)
    }

    async fn try_update_review(
        &self,
        review_id: &ReviewId,
        patch: &ReviewPatch,
    ) -> CoreResult<Review> {
        let mut txn = Transaction::begin(Arc::clone(&self.store));

        let mut review: Review = txn
            .fetch_required(&DocumentId::from_display(review_id))
            .await?;

        if let Some(new_rating) = patch.rating {
            if new_rating != review.rating {
                let mut product: Product = txn
                    .fetch_required(&DocumentId::from_display(&review.product_id))
                    .await?;
                product.rating = rating_after_update(
                    product.rating,
                    product.review_count,
                    review.rating,
                    new_rating,
                );
                product.updated_at = Timestamp::now();
                txn.update(&product)?;
                review.rating = new_rating;
            }
        }
        if let Some(comment) = &patch.comment {
            review.comment = comment.clone();
        }
        review.updated_at = Timestamp::now();

        txn.update(&review)?;
        txn.commit().await?;
        Ok(review)
    }

    async fn try_delete_review(&self, review_id: &ReviewId) -> CoreResult<Review> {
        let mut txn = Transaction::begin(Arc::clone(&self.store));

        let review: Review = txn
            .fetch_required(&DocumentId::from_display(review_id))
            .await?;
        let mut product: Product = txn
            .fetch_required(&DocumentId::from_display(&review.product_id))
            .await?;

        let (average, count) =
            rating_after_delete(product.rating, product.review_count, review.rating);
        product.rating = average;
        product.review_count = count;
        product.updated_at = Timestamp::now();

        txn.delete::<Review>(&DocumentId::from_display(review_id))?;
        txn.update(&product)?;
        txn.commit().await?;
        Ok(review)
    }
}
