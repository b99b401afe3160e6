//! Session memory
//!
//! Per-user conversation history, portfolio, goals and preferences, plus the
//! store that owns their lifecycle (create on first message, evict on idle).

pub mod session;
pub mod store;

pub use session::{Message, MessageMetadata, Role, Session, SessionSummary, SessionUpdate};
pub use store::{SessionLease, SessionStore};
