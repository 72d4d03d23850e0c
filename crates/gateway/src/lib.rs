//! The Quarry gateway: investigation bridge, HTTP/WebSocket API, CLI,
//! and workflow catalog around the agent runtime.

pub mod api;
pub mod bridge;
pub mod cli;
pub mod investigations;
pub mod state;
pub mod workflows;
