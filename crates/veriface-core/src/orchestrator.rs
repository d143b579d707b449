//! Live-first verification with a local simulation fallback.
//!
//! One capture event produces exactly one [`VerificationOutcome`]. A live
//! backend answer always wins, even a negative one; simulation only runs
//! when the recognizer itself fails at the transport level.

use crate::simulate::Simulator;
use crate::types::{ImagePayload, Recognizer, VerificationOutcome};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Drives verification attempts against an injected [`Recognizer`].
pub struct Orchestrator<R> {
    recognizer: R,
    simulator: Mutex<Simulator>,
}

impl<R: Recognizer> Orchestrator<R> {
    pub fn new(recognizer: R) -> Self {
        Self::with_simulator(recognizer, Simulator::new())
    }

    /// Construct with a caller-supplied simulator, usually seeded.
    pub fn with_simulator(recognizer: R, simulator: Simulator) -> Self {
        Self {
            recognizer,
            simulator: Mutex::new(simulator),
        }
    }

    /// Verify one image. Never fails: a recognizer error falls back to a
    /// locally simulated outcome after an artificial processing delay.
    /// `processing_time_ms` is always overwritten with the elapsed wall
    /// time measured here, whichever path produced the outcome.
    pub async fn verify(&self, image: &ImagePayload) -> VerificationOutcome {
        let start = Instant::now();
        match self.recognizer.recognize(image).await {
            Ok(mut outcome) => {
                outcome.processing_time_ms = Some(start.elapsed().as_millis() as u64);
                tracing::info!(
                    matched = outcome.matched,
                    elapsed_ms = outcome.processing_time_ms,
                    "live verification result"
                );
                outcome
            }
            Err(err) => {
                tracing::warn!(error = %err, "recognizer failed, simulating locally");
                let delay_ms = self.lock_simulator().draw_delay_ms();
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                let elapsed_ms = start.elapsed().as_millis() as u64;
                let outcome = self.lock_simulator().outcome(elapsed_ms);
                tracing::info!(
                    matched = outcome.matched,
                    elapsed_ms,
                    "simulated verification result"
                );
                outcome
            }
        }
    }

    fn lock_simulator(&self) -> std::sync::MutexGuard<'_, Simulator> {
        // Simulator state is just rng position, safe to keep after a panic.
        self.simulator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
