use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One individual admission unit. Created exactly once per (order, unit)
/// pair by the generation workflow; `is_validated` only ever transitions
/// false -> true.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: i64,
    pub order_id: i64,
    pub event_id: i64,
    pub ticket_type_id: i64,
    pub pass_id: String,
    pub is_validated: bool,
    pub validated_at: Option<DateTime<Utc>>,
    pub attendee_name: String,
    pub attendee_email: String,
    pub attendee_phone: String,
    pub pdf_path: Option<String>,
    pub created_at: DateTime<Utc>,
}
