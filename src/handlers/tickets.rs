use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Event, Ticket, DEFAULT_CATEGORY_NAME, DEFAULT_TICKET_TYPE_NAME};
use crate::state::AppState;
use crate::storage::MarketplaceStore;
use crate::ticketing::GenerationOutcome;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

#[derive(Debug, Deserialize)]
pub struct CreateTicketsRequest {
    pub order_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct TicketSummary {
    pub ticket_id: i64,
    pub pass_id: String,
    pub attendee_name: String,
    pub pdf_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TicketsGeneratedPayload {
    pub order_id: i64,
    pub tickets: Vec<TicketSummary>,
    pub warnings: Vec<String>,
}

impl From<GenerationOutcome> for TicketsGeneratedPayload {
    fn from(outcome: GenerationOutcome) -> Self {
        Self {
            order_id: outcome.order_id,
            tickets: outcome
                .tickets
                .into_iter()
                .map(|t| TicketSummary {
                    ticket_id: t.id,
                    pass_id: t.pass_id,
                    attendee_name: t.attendee_name,
                    pdf_path: t.pdf_path,
                })
                .collect(),
            warnings: outcome.warnings,
        }
    }
}

/// POST /tickets — expands a paid order into individual tickets.
pub async fn create_tickets(
    State(state): State<AppState>,
    Json(request): Json<CreateTicketsRequest>,
) -> Result<Response, AppError> {
    let order_id = request
        .order_id
        .ok_or_else(|| AppError::ValidationError("order_id is required".to_string()))?;

    let outcome = state.generator.generate_for_order(order_id).await?;
    let already_existed = outcome.already_existed;
    let payload = TicketsGeneratedPayload::from(outcome);

    if already_existed {
        Ok(success(payload, "Tickets already generated for this order"))
    } else {
        Ok(created(payload, "Tickets generated successfully"))
    }
}

#[derive(Debug, Deserialize)]
pub struct ListTicketsQuery {
    pub order_id: Option<i64>,
    pub user_id: Option<Uuid>,
    pub pass_id: Option<String>,
}

/// Ticket joined at read time with display names from the event catalog.
#[derive(Debug, Serialize)]
pub struct EnrichedTicket {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub event_title: Option<String>,
    pub ticket_type_name: String,
    pub category_name: String,
}

/// GET /tickets?order_id=|user_id=|pass_id= — exactly one filter required.
pub async fn list_tickets(
    State(state): State<AppState>,
    Query(query): Query<ListTicketsQuery>,
) -> Result<Response, AppError> {
    let filters = [
        query.order_id.is_some(),
        query.user_id.is_some(),
        query.pass_id.is_some(),
    ]
    .iter()
    .filter(|set| **set)
    .count();
    if filters != 1 {
        return Err(AppError::ValidationError(
            "exactly one of order_id, user_id or pass_id is required".to_string(),
        ));
    }

    let tickets = if let Some(order_id) = query.order_id {
        state.store.tickets_for_order(order_id).await?
    } else if let Some(user_id) = query.user_id {
        state.store.tickets_for_user(user_id).await?
    } else {
        let pass_id = query.pass_id.as_deref().unwrap_or_default();
        state
            .store
            .find_ticket_by_pass(pass_id)
            .await?
            .into_iter()
            .collect()
    };

    let enriched = enrich(state.store.as_ref(), tickets).await?;
    Ok(success(enriched, "Tickets retrieved"))
}

async fn enrich(
    store: &dyn MarketplaceStore,
    tickets: Vec<Ticket>,
) -> Result<Vec<EnrichedTicket>, AppError> {
    let mut events: HashMap<i64, Option<Event>> = HashMap::new();
    let mut enriched = Vec::with_capacity(tickets.len());

    for ticket in tickets {
        if !events.contains_key(&ticket.event_id) {
            let event = store.find_event(ticket.event_id).await?;
            events.insert(ticket.event_id, event);
        }
        let event = events.get(&ticket.event_id).and_then(|e| e.as_ref());
        let (ticket_type_name, category_name) = event
            .map(|e| e.resolve_ticket_type(ticket.ticket_type_id))
            .unwrap_or_else(|| {
                (
                    DEFAULT_TICKET_TYPE_NAME.to_string(),
                    DEFAULT_CATEGORY_NAME.to_string(),
                )
            });
        enriched.push(EnrichedTicket {
            event_title: event.map(|e| e.title.clone()),
            ticket_type_name,
            category_name,
            ticket,
        });
    }
    Ok(enriched)
}

#[derive(Debug, Deserialize)]
pub struct ValidateTicketRequest {
    pub pass_id: Option<String>,
}

/// PUT /tickets — marks a ticket as used at the gate. One-way transition.
pub async fn validate_ticket(
    State(state): State<AppState>,
    Json(request): Json<ValidateTicketRequest>,
) -> Result<Response, AppError> {
    let pass_id = request
        .pass_id
        .ok_or_else(|| AppError::ValidationError("pass_id is required".to_string()))?;

    let ticket = state
        .store
        .find_ticket_by_pass(&pass_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Ticket not found".to_string()))?;

    if ticket.is_validated {
        return Err(AppError::PreconditionFailed(
            "Ticket already validated".to_string(),
        ));
    }

    let updated = state
        .store
        .mark_validated(&pass_id, Utc::now())
        .await?
        // A concurrent scan can win between the read and the update.
        .ok_or_else(|| {
            AppError::PreconditionFailed("Ticket already validated".to_string())
        })?;

    Ok(success(updated, "Ticket validated"))
}
