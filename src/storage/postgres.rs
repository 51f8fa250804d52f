use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Event, Order, Ticket};

use super::{MarketplaceStore, StoreError};

/// Name of the unique index guarding pass-id collisions, created by the
/// tickets migration.
const PASS_ID_CONSTRAINT: &str = "tickets_pass_id_key";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_insert_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.constraint() == Some(PASS_ID_CONSTRAINT) {
            return StoreError::PassIdConflict;
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl MarketplaceStore for PgStore {
    async fn find_order(&self, order_id: i64) -> Result<Option<Order>, StoreError> {
        let order = sqlx::query_as::<_, Order>(
            "SELECT id, user_id, payment_status, order_items, attendee_info, created_at \
             FROM orders WHERE id = $1",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(order)
    }

    async fn find_event(&self, event_id: i64) -> Result<Option<Event>, StoreError> {
        let event = sqlx::query_as::<_, Event>(
            "SELECT id, title, policy_text, categories, created_at \
             FROM events WHERE id = $1",
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(event)
    }

    async fn tickets_for_order(&self, order_id: i64) -> Result<Vec<Ticket>, StoreError> {
        let tickets = sqlx::query_as::<_, Ticket>(
            "SELECT * FROM tickets WHERE order_id = $1 ORDER BY id",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tickets)
    }

    async fn tickets_for_user(&self, user_id: Uuid) -> Result<Vec<Ticket>, StoreError> {
        let tickets = sqlx::query_as::<_, Ticket>(
            "SELECT t.* FROM tickets t \
             JOIN orders o ON o.id = t.order_id \
             WHERE o.user_id = $1 ORDER BY t.id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tickets)
    }

    async fn find_ticket_by_pass(&self, pass_id: &str) -> Result<Option<Ticket>, StoreError> {
        let ticket = sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE pass_id = $1")
            .bind(pass_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(ticket)
    }

    async fn next_ticket_id(&self) -> Result<i64, StoreError> {
        let id: i64 = sqlx::query_scalar("SELECT nextval('ticket_id_seq')")
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }

    async fn insert_tickets(&self, order_id: i64, tickets: &[Ticket]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        // Serialize generation per order so the existence check and the
        // inserts cannot interleave with a concurrent invocation.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(order_id)
            .execute(&mut *tx)
            .await?;

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM tickets WHERE order_id = $1)")
                .bind(order_id)
                .fetch_one(&mut *tx)
                .await?;
        if exists {
            return Err(StoreError::AlreadyGenerated);
        }

        for ticket in tickets {
            sqlx::query(
                "INSERT INTO tickets \
                 (id, order_id, event_id, ticket_type_id, pass_id, is_validated, validated_at, \
                  attendee_name, attendee_email, attendee_phone, pdf_path, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            )
            .bind(ticket.id)
            .bind(ticket.order_id)
            .bind(ticket.event_id)
            .bind(ticket.ticket_type_id)
            .bind(&ticket.pass_id)
            .bind(ticket.is_validated)
            .bind(ticket.validated_at)
            .bind(&ticket.attendee_name)
            .bind(&ticket.attendee_email)
            .bind(&ticket.attendee_phone)
            .bind(&ticket.pdf_path)
            .bind(ticket.created_at)
            .execute(&mut *tx)
            .await
            .map_err(map_insert_error)?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn mark_validated(
        &self,
        pass_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Ticket>, StoreError> {
        let ticket = sqlx::query_as::<_, Ticket>(
            "UPDATE tickets SET is_validated = TRUE, validated_at = $2 \
             WHERE pass_id = $1 AND is_validated = FALSE \
             RETURNING *",
        )
        .bind(pass_id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(ticket)
    }
}
