use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// Payment lifecycle of an order. Ticket generation only runs against
/// `Completed` orders; all other states are upstream concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        };
        f.write_str(s)
    }
}

/// One line of a purchase: a ticket type and how many units of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub event_id: i64,
    pub ticket_type_id: i64,
    pub quantity: u32,
    pub unit_price: Decimal,
}

/// Contact details for a single ticket unit. The order carries one flat
/// list of these, positionally aligned with the expansion of all order
/// items' quantities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendeeInfo {
    pub name: String,
    pub email: String,
    pub phone: String,
}

impl AttendeeInfo {
    /// Placeholder identity used when the attendee list is shorter than
    /// the total ticket-unit count.
    pub fn guest() -> Self {
        Self {
            name: "Guest".to_string(),
            email: "guest@example.com".to_string(),
            phone: "N/A".to_string(),
        }
    }
}

/// A purchase attempt. Read-only to the ticket workflow; written by the
/// checkout and payment flows.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: i64,
    pub user_id: Uuid,
    pub payment_status: PaymentStatus,
    pub order_items: Json<Vec<OrderItem>>,
    pub attendee_info: Json<Vec<AttendeeInfo>>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Total ticket units across all order items.
    pub fn total_units(&self) -> usize {
        self.order_items
            .iter()
            .map(|item| item.quantity as usize)
            .sum()
    }
}
