//! veriface-core — Verification data model, local simulator, and orchestrator.
//!
//! Defines the outcome and audit-log types shared across the workspace,
//! the simulator that stands in for an unreachable recognition backend,
//! and the orchestrator that picks between the two.

pub mod orchestrator;
pub mod simulate;
pub mod types;

pub use orchestrator::Orchestrator;
pub use simulate::Simulator;
pub use types::{
    DeviceInfo, FraudIndicators, GeoLocation, HealthReport, IdentityRecord, ImagePayload,
    ImageQuality, RecognizeError, Recognizer, Roster, RosterMember, VerificationLogEntry,
    VerificationOutcome,
};
