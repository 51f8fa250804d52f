use std::sync::Arc;

use crate::storage::MarketplaceStore;
use crate::ticketing::TicketGenerator;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MarketplaceStore>,
    pub generator: Arc<TicketGenerator>,
}
