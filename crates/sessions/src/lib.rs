//! Investigation sessions — the working memory of an agent run — and the
//! JSON codec that persists them for resume and audit.

pub mod codec;
pub mod session;

pub use codec::{list_sessions, load_session, save_session, SavedSessionInfo};
pub use session::{Session, SessionSummary, ToolUse};
