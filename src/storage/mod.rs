use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Event, Order, Ticket};

pub mod postgres;

pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The atomic existence check inside `insert_tickets` found tickets
    /// already persisted for the order.
    #[error("tickets already generated for this order")]
    AlreadyGenerated,

    /// Unique-index violation on `pass_id`; the caller regenerates the
    /// colliding pass ids and retries.
    #[error("pass id conflict")]
    PassIdConflict,
}

/// Persistence seam for the ticket workflow. Orders and events are
/// read-only through this trait; only tickets are written.
#[async_trait]
pub trait MarketplaceStore: Send + Sync {
    async fn find_order(&self, order_id: i64) -> Result<Option<Order>, StoreError>;

    async fn find_event(&self, event_id: i64) -> Result<Option<Event>, StoreError>;

    async fn tickets_for_order(&self, order_id: i64) -> Result<Vec<Ticket>, StoreError>;

    async fn tickets_for_user(&self, user_id: Uuid) -> Result<Vec<Ticket>, StoreError>;

    async fn find_ticket_by_pass(&self, pass_id: &str) -> Result<Option<Ticket>, StoreError>;

    /// Allocates the next ticket identifier: strictly increasing, starting
    /// at 1, safe under concurrent callers.
    async fn next_ticket_id(&self) -> Result<i64, StoreError>;

    /// Persists a generated batch atomically. The implementation must
    /// re-check that no tickets exist for `order_id` and insert the whole
    /// batch under the same guard, failing with `AlreadyGenerated` if a
    /// concurrent invocation won the race.
    async fn insert_tickets(&self, order_id: i64, tickets: &[Ticket]) -> Result<(), StoreError>;

    /// Marks a ticket validated. Returns `None` when the pass id is
    /// unknown or the ticket was already validated (the flag is one-way).
    async fn mark_validated(
        &self,
        pass_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Ticket>, StoreError>;
}
