pub mod generator;
pub mod pass_id;
pub mod pdf;

pub use generator::{GenerateError, GenerationOutcome, TicketGenerator};
pub use pass_id::{decode_pass_id, generate_pass_id, PASS_ID_LEN};
pub use pdf::{word_wrap, TicketPdfRenderer};
