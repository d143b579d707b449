//! veriface-client — resilient multi-candidate HTTP client for the
//! recognition backend.
//!
//! Connectivity is health-check gated: [`RecognitionClient`] only calls a
//! backend it has verified recently, sweeps candidate endpoints with
//! last-known-good promotion, and soft-fails recognition into a sentinel
//! outcome instead of erroring.

pub mod client;
pub mod endpoints;
pub mod poller;

pub use client::{
    ClientConfig, ClientError, ConnectionStatus, EndpointProbe, EnrollAck, RecognitionClient,
    UNREACHABLE_REASON,
};
pub use endpoints::{candidate_endpoints, DEFAULT_PORT};
pub use poller::HealthPoller;
