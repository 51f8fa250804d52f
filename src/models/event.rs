use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

pub const DEFAULT_TICKET_TYPE_NAME: &str = "Standard Ticket";
pub const DEFAULT_CATEGORY_NAME: &str = "General";

/// One sellable ticket type inside an event's catalog.
///
/// `pdf_template_path` is carried in the catalog but the renderer currently
/// uses a single fixed template for every ticket type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketType {
    pub id: i64,
    pub name: String,
    pub price: Decimal,
    pub quantity_available: i64,
    #[serde(default)]
    pub pdf_template_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventCategory {
    pub name: String,
    pub ticket_types: Vec<TicketType>,
}

/// A ticketed occasion. Read-only to the ticket workflow, which uses it to
/// resolve display names and to supply policy text for the PDF.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: i64,
    pub title: String,
    pub policy_text: String,
    pub categories: Json<Vec<EventCategory>>,
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Resolves a ticket-type id to `(ticket_type_name, category_name)` by
    /// scanning the embedded catalog. Falls back to the default display
    /// names when the id is not present.
    pub fn resolve_ticket_type(&self, ticket_type_id: i64) -> (String, String) {
        for category in self.categories.iter() {
            for ticket_type in &category.ticket_types {
                if ticket_type.id == ticket_type_id {
                    return (ticket_type.name.clone(), category.name.clone());
                }
            }
        }
        (
            DEFAULT_TICKET_TYPE_NAME.to_string(),
            DEFAULT_CATEGORY_NAME.to_string(),
        )
    }
}
