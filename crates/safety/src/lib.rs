//! Safety harness — unified pre/post gate for the agent loop.
//!
//! Composes three optional capabilities into a single interface the loop
//! calls around every tool invocation:
//!
//! - [`shield::Shield`] — policy gate: budget, per-tool rate limits, and a
//!   per-tool circuit breaker;
//! - [`monitor::SecurityMonitor`] — injection/traversal detectors over
//!   text;
//! - [`redact::PiiRedactor`] — PII detection and replacement.
//!
//! A capability is disabled by absence. The harness runs in *observe*
//! mode during an investigation (blocks are recorded, not enforced) and
//! always scrubs at the publication boundary.

pub mod audit;
pub mod harness;
pub mod monitor;
pub mod redact;
pub mod shield;

pub use audit::{AuditSummary, CheckMode, CheckOutcome, SafetyEvent};
pub use harness::{PostCheckResult, PreCheckVerdict, PublicationResult, SafetyHarness};
