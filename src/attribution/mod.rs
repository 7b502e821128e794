//! Deferred deep-link attribution
//!
//! - `engine`: click/open ingestion
//! - `matcher`: fingerprint matching with compare-and-set commit
//! - `fraud`: click-flood detection
//! - `sweep`: background retry of unattributed opens
//! - `pending`: write-behind queue for events the store rejected

pub mod engine;
pub mod fraud;
pub mod matcher;
pub mod pending;
pub mod sweep;

pub use engine::{
    AttributionEngine, AttributionResult, AttributionStatus, ClickRequest, OpenRequest,
    RedirectDecision,
};
pub use fraud::FraudGuard;
pub use matcher::{FingerprintMatcher, MatchOutcome, select_match};
pub use pending::{FlushReport, PendingWrites};
pub use sweep::{AttributionSweep, SweepReport};
