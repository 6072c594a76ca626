//! Best-effort audit logging.
//!
//! The audit log is a fire-and-forget event sink: failures are logged and
//! swallowed, never propagated to the caller of a core operation. Services
//! record an entry after each committed mutation via
//! [`record_best_effort`].

use crate::types::UserId;
use async_trait::async_trait;
use std::fmt::Display;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{info, warn};

/// The kind of event being audited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditKind {
    /// An order was created
    OrderCreated,
    /// An order was cancelled and its stock restored
    OrderCancelled,
    /// An order's status or payment fields changed
    OrderUpdated,
    /// A product's stock was manually adjusted
    StockAdjusted,
    /// A product was created and assigned a SKU
    ProductCreated,
    /// A review was created
    ReviewCreated,
    /// A review was updated
    ReviewUpdated,
    /// A review was deleted
    ReviewDeleted,
}

impl Display for AuditKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::OrderCreated => "order_created",
            Self::OrderCancelled => "order_cancelled",
            Self::OrderUpdated => "order_updated",
            Self::StockAdjusted => "stock_adjusted",
            Self::ProductCreated => "product_created",
            Self::ReviewCreated => "review_created",
            Self::ReviewUpdated => "review_updated",
            Self::ReviewDeleted => "review_deleted",
        };
        f.write_str(kind)
    }
}

/// One audit record: who did what to which subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    /// The acting user
    pub actor: UserId,
    /// What happened
    pub kind: AuditKind,
    /// Id of the affected entity
    pub subject: String,
    /// Free-form detail
    pub detail: String,
}

impl AuditEntry {
    /// Creates an audit entry.
    pub fn new(
        actor: UserId,
        kind: AuditKind,
        subject: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            actor,
            kind,
            subject: subject.into(),
            detail: detail.into(),
        }
    }
}

/// Errors an audit sink may report. Callers never see these; they are
/// logged and discarded.
#[derive(Debug, Clone, Error)]
pub enum AuditError {
    /// The sink could not accept the entry.
    #[error("Audit sink unavailable: {0}")]
    Unavailable(String),
}

/// An asynchronous, best-effort event sink.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Records one entry.
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError>;
}

/// Records an entry, logging and swallowing any failure.
pub async fn record_best_effort(log: &dyn AuditLog, entry: AuditEntry) {
    if let Err(err) = log.record(entry).await {
        warn!(error = %err, "audit record failed, dropping event");
    }
}

/// Audit sink that emits entries as structured log events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditLog;

#[async_trait]
impl AuditLog for TracingAuditLog {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        info!(
            actor = %entry.actor,
            kind = %entry.kind,
            subject = %entry.subject,
            detail = %entry.detail,
            "audit event"
        );
        Ok(())
    }
}

/// Audit sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAuditLog;

#[async_trait]
impl AuditLog for NullAuditLog {
    async fn record(&self, _entry: AuditEntry) -> Result<(), AuditError> {
        Ok(())
    }
}

/// Audit sink that captures entries in memory, for tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingAuditLog {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl RecordingAuditLog {
    /// Creates an empty recording sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// The entries recorded so far.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().expect("Mutex poisoned").clone()
    }
}

#[async_trait]
impl AuditLog for RecordingAuditLog {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        self.entries.lock().expect("Mutex poisoned").push(entry);
        Ok(())
    }
}
