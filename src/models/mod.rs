pub mod event;
pub mod order;
pub mod ticket;

pub use event::{Event, EventCategory, TicketType, DEFAULT_CATEGORY_NAME, DEFAULT_TICKET_TYPE_NAME};
pub use order::{AttendeeInfo, Order, OrderItem, PaymentStatus};
pub use ticket::Ticket;
