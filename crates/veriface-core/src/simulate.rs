//! Local verification outcome simulator.
//!
//! Stands in for the recognition backend when none is reachable, so the
//! product keeps working end to end offline. All randomness flows through
//! a seedable generator; the gate values are drawn up front into [`Draws`]
//! so tests can force every branch without fishing for seeds.

use crate::types::{
    FraudIndicators, IdentityRecord, ImageQuality, PublicRecords, SocialMedia,
    VerificationHistory, VerificationOutcome,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::OnceLock;

// Reference policy bands for simulated draws.
const BRIGHTNESS_BAND: (f64, f64) = (0.6, 1.0);
const SHARPNESS_BAND: (f64, f64) = (0.7, 1.0);
const FACE_SIZE_BAND: (f64, f64) = (0.5, 1.0);
const ANGLE_BAND: (f64, f64) = (0.6, 1.0);
const LIVENESS_BAND: (f64, f64) = (0.65, 0.95);

/// Liveness below this fails the anti-spoof gate.
const LIVENESS_GATE: f64 = 0.70;
/// Mean quality at or below this cannot match.
const QUALITY_GATE: f64 = 0.65;
/// Accept probability once quality passes.
const ACCEPT_PROBABILITY: f64 = 0.7;

/// Artificial processing delay bounds, milliseconds.
pub const SIM_DELAY_MIN_MS: u64 = 1200;
pub const SIM_DELAY_MAX_MS: u64 = 2000;

static SAMPLE_ROSTER: OnceLock<Vec<IdentityRecord>> = OnceLock::new();

/// Synthesizes verification outcomes from random draws.
pub struct Simulator {
    rng: StdRng,
}

impl Simulator {
    /// Entropy-seeded simulator for production use.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic simulator for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Pick the artificial processing delay for one simulated attempt.
    pub fn draw_delay_ms(&mut self) -> u64 {
        self.rng.gen_range(SIM_DELAY_MIN_MS..=SIM_DELAY_MAX_MS)
    }

    /// Produce one simulated outcome. `elapsed_ms` is the measured wall
    /// time of the whole verify attempt and is carried through verbatim.
    pub fn outcome(&mut self, elapsed_ms: u64) -> VerificationOutcome {
        let draws = Draws::sample(&mut self.rng);
        tracing::debug!(
            liveness = draws.liveness,
            quality = draws.quality.quality_score(),
            "simulated draws"
        );
        outcome_from_draws(&draws, &mut self.rng, elapsed_ms)
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Gate values for one simulated attempt, drawn before branching.
struct Draws {
    quality: ImageQuality,
    liveness: f64,
    /// Uniform in [0, 1); below [`ACCEPT_PROBABILITY`] accepts.
    accept_roll: f64,
}

impl Draws {
    fn sample(rng: &mut StdRng) -> Self {
        Self {
            quality: ImageQuality {
                brightness: rng.gen_range(BRIGHTNESS_BAND.0..BRIGHTNESS_BAND.1),
                sharpness: rng.gen_range(SHARPNESS_BAND.0..SHARPNESS_BAND.1),
                face_size: rng.gen_range(FACE_SIZE_BAND.0..FACE_SIZE_BAND.1),
                angle_quality: rng.gen_range(ANGLE_BAND.0..ANGLE_BAND.1),
            },
            liveness: rng.gen_range(LIVENESS_BAND.0..LIVENESS_BAND.1),
            accept_roll: rng.gen(),
        }
    }
}

/// Branch decision over pre-drawn gate values. The rng only colors the
/// losing branches (confidence jitter, fraud indicators, reason choice).
fn outcome_from_draws(draws: &Draws, rng: &mut StdRng, elapsed_ms: u64) -> VerificationOutcome {
    if draws.liveness < LIVENESS_GATE {
        let indicators = FraudIndicators {
            suspicious_timing: rng.gen_bool(0.3),
            device_fingerprint_mismatch: rng.gen_bool(0.2),
            ..FraudIndicators::default()
        };
        let raised = indicators.any();
        return VerificationOutcome {
            matched: false,
            confidence: Some(rng.gen_range(0.2..0.5)),
            liveness: Some(draws.liveness),
            identity: None,
            reason: Some("Liveness check failed - potential spoof detected".to_string()),
            fraud_indicators: raised.then_some(indicators),
            processing_time_ms: Some(elapsed_ms),
            image_quality: Some(draws.quality.clone()),
        };
    }

    let accepted =
        draws.quality.quality_score() > QUALITY_GATE && draws.accept_roll < ACCEPT_PROBABILITY;
    if !accepted {
        let indicators = FraudIndicators {
            multiple_attempts: rng.gen_bool(0.4),
            suspicious_timing: rng.gen_bool(0.3),
            device_fingerprint_mismatch: rng.gen_bool(0.2),
            location_anomaly: rng.gen_bool(0.1),
        };
        let raised = indicators.any();
        let reason = if rng.gen_bool(0.5) {
            "No matching identity found in database"
        } else {
            "Face match confidence too low"
        };
        return VerificationOutcome {
            matched: false,
            confidence: Some(rng.gen_range(0.1..0.5)),
            liveness: Some(draws.liveness),
            identity: None,
            reason: Some(reason.to_string()),
            fraud_indicators: raised.then_some(indicators),
            processing_time_ms: Some(elapsed_ms),
            image_quality: Some(draws.quality.clone()),
        };
    }

    let roster = sample_roster();
    let identity = roster[rng.gen_range(0..roster.len())].clone();
    VerificationOutcome {
        matched: true,
        confidence: Some(rng.gen_range(0.75..1.0)),
        liveness: Some(draws.liveness),
        identity: Some(identity),
        reason: None,
        fraud_indicators: None,
        processing_time_ms: Some(elapsed_ms),
        image_quality: Some(draws.quality.clone()),
    }
}

/// Fixed local roster a successful simulated match draws from.
pub fn sample_roster() -> &'static [IdentityRecord] {
    SAMPLE_ROSTER.get_or_init(build_sample_roster)
}

fn build_sample_roster() -> Vec<IdentityRecord> {
    vec![
        IdentityRecord {
            full_name: "Adebayo Johnson".to_string(),
            nin: Some("12345678901".to_string()),
            license_number: Some("LAG-AB123456".to_string()),
            gender: Some("Male".to_string()),
            age_estimate: Some(32),
            phone: Some("+234-801-234-5678".to_string()),
            email: Some("adebayo.johnson@email.com".to_string()),
            address: Some("15 Victoria Island, Lagos State, Nigeria".to_string()),
            social_media: Some(SocialMedia {
                facebook: Some("facebook.com/adebayo.johnson".to_string()),
                twitter: Some("@adebayoj".to_string()),
                instagram: None,
                linkedin: Some("linkedin.com/in/adebayo-johnson".to_string()),
            }),
            public_records: Some(PublicRecords {
                voter_registration: Some(true),
                business_registration: Some("RC123456 - Johnson Enterprises".to_string()),
                education: Some(vec![
                    "University of Lagos - Computer Science".to_string(),
                    "Lagos Business School - MBA".to_string(),
                ]),
                employment: Some("Senior Software Engineer at TechCorp Nigeria".to_string()),
            }),
            verification_history: Some(VerificationHistory {
                last_verified: Some("2024-01-15T10:30:00Z".to_string()),
                verification_count: Some(12),
                risk_score: Some(15),
            }),
            extra: Default::default(),
        },
        IdentityRecord {
            full_name: "Fatima Abdullahi".to_string(),
            nin: Some("98765432109".to_string()),
            license_number: Some("ABJ-CD789012".to_string()),
            gender: Some("Female".to_string()),
            age_estimate: Some(28),
            phone: Some("+234-803-987-6543".to_string()),
            email: Some("fatima.abdullahi@email.com".to_string()),
            address: Some("42 Garki District, Abuja, FCT, Nigeria".to_string()),
            social_media: Some(SocialMedia {
                facebook: None,
                twitter: None,
                instagram: Some("@fatima_abdullahi".to_string()),
                linkedin: Some("linkedin.com/in/fatima-abdullahi".to_string()),
            }),
            public_records: Some(PublicRecords {
                voter_registration: Some(true),
                business_registration: None,
                education: Some(vec!["Ahmadu Bello University - Medicine".to_string()]),
                employment: Some("Medical Doctor at National Hospital Abuja".to_string()),
            }),
            verification_history: Some(VerificationHistory {
                last_verified: Some("2024-01-20T14:45:00Z".to_string()),
                verification_count: Some(8),
                risk_score: Some(5),
            }),
            extra: Default::default(),
        },
        IdentityRecord {
            full_name: "Chinedu Okafor".to_string(),
            nin: Some("11223344556".to_string()),
            license_number: Some("PH-EF345678".to_string()),
            gender: Some("Male".to_string()),
            age_estimate: Some(35),
            phone: Some("+234-805-111-2233".to_string()),
            email: Some("chinedu.okafor@email.com".to_string()),
            address: Some("78 GRA Phase 2, Port Harcourt, Rivers State, Nigeria".to_string()),
            social_media: Some(SocialMedia {
                facebook: Some("facebook.com/chinedu.okafor".to_string()),
                twitter: Some("@chineduo".to_string()),
                instagram: Some("@chinedu_okafor".to_string()),
                linkedin: None,
            }),
            public_records: Some(PublicRecords {
                voter_registration: Some(true),
                business_registration: Some("RC789012 - Okafor Oil Services Ltd".to_string()),
                education: Some(vec![
                    "University of Port Harcourt - Petroleum Engineering".to_string(),
                ]),
                employment: Some("CEO at Okafor Oil Services Ltd".to_string()),
            }),
            verification_history: Some(VerificationHistory {
                last_verified: Some("2024-01-18T09:15:00Z".to_string()),
                verification_count: Some(25),
                risk_score: Some(8),
            }),
            extra: Default::default(),
        },
    ]
}
