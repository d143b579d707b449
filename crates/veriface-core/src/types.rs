//! Wire and storage types for verification outcomes and the audit log.
//!
//! Field names follow the recognition backend's JSON contract, so outcomes
//! parsed from a live backend and outcomes produced by the local simulator
//! serialize identically.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Canonical result of one verification attempt.
///
/// Produced verbatim by the recognition backend or synthesized by the
/// local simulator; the presentation layer cannot tell the two apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub matched: bool,
    /// Match confidence in [0, 1].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Anti-spoof liveness score in [0, 1].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liveness: Option<f64>,
    /// Matched identity. Present only when `matched` is true; serialized
    /// as an explicit `null` otherwise, matching the backend contract.
    #[serde(default)]
    pub identity: Option<IdentityRecord>,
    /// Human-readable explanation for non-matches and system conditions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fraud_indicators: Option<FraudIndicators>,
    /// Wall-clock processing time in milliseconds.
    #[serde(
        rename = "processing_time",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub processing_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_quality: Option<ImageQuality>,
}

impl VerificationOutcome {
    /// Sentinel outcome for an unreachable backend: not matched, zeroed
    /// scores, explanatory reason. Never synthesized with an identity.
    pub fn unreachable(reason: impl Into<String>) -> Self {
        Self {
            matched: false,
            confidence: Some(0.0),
            liveness: Some(0.0),
            identity: None,
            reason: Some(reason.into()),
            fraud_indicators: None,
            processing_time_ms: None,
            image_quality: None,
        }
    }

    /// Structural invariant: an attached identity implies a match.
    pub fn is_well_formed(&self) -> bool {
        self.identity.is_none() || self.matched
    }
}

/// Per-attempt fraud signals. All default to false; absent on the wire
/// means none were raised.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FraudIndicators {
    #[serde(default)]
    pub multiple_attempts: bool,
    #[serde(default)]
    pub suspicious_timing: bool,
    #[serde(default)]
    pub device_fingerprint_mismatch: bool,
    #[serde(default)]
    pub location_anomaly: bool,
}

impl FraudIndicators {
    /// True when at least one indicator is raised.
    pub fn any(&self) -> bool {
        self.multiple_attempts
            || self.suspicious_timing
            || self.device_fingerprint_mismatch
            || self.location_anomaly
    }
}

/// Capture quality sub-scores, each in [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageQuality {
    #[serde(default)]
    pub brightness: f64,
    #[serde(default)]
    pub sharpness: f64,
    #[serde(default)]
    pub face_size: f64,
    #[serde(default)]
    pub angle_quality: f64,
}

impl ImageQuality {
    /// Arithmetic mean of the four sub-scores.
    pub fn quality_score(&self) -> f64 {
        (self.brightness + self.sharpness + self.face_size + self.angle_quality) / 4.0
    }
}

/// Identity payload attached to a positive match.
///
/// Treated as an opaque value object: `full_name` is the only field this
/// layer requires, every other known field is optional, and fields this
/// schema does not know about survive a round trip through `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub full_name: String,
    /// National identification number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_estimate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social_media: Option<SocialMedia>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_records: Option<PublicRecords>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_history: Option<VerificationHistory>,
    /// Backend fields outside this schema, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl IdentityRecord {
    /// Minimal record with just a name; used by tests and roster fallback.
    pub fn named(full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            nin: None,
            license_number: None,
            gender: None,
            age_estimate: None,
            phone: None,
            email: None,
            address: None,
            social_media: None,
            public_records: None,
            verification_history: None,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SocialMedia {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facebook: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instagram: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublicRecords {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voter_registration: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_registration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub education: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employment: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerificationHistory {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_verified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_count: Option<u32>,
    /// 0..=100, lower is better.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<u32>,
}

/// One persisted verification attempt. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationLogEntry {
    /// Unique within the ledger's lifetime: timestamp plus random suffix.
    pub id: String,
    /// Attempt time, milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub officer_id: Option<String>,
    pub result: VerificationOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoLocation>,
    pub device_info: DeviceInfo,
}

impl VerificationLogEntry {
    /// Build an entry for an outcome produced just now.
    pub fn record(
        result: VerificationOutcome,
        officer_id: Option<String>,
        location: Option<GeoLocation>,
        device_info: DeviceInfo,
    ) -> Self {
        let now_ms = chrono::Utc::now().timestamp_millis();
        Self {
            id: entry_id(now_ms),
            timestamp: now_ms,
            officer_id,
            result,
            location,
            device_info,
        }
    }
}

/// `log_<timestamp>_<random>` with a uuid-derived suffix, so collisions
/// within one ledger lifetime are vanishingly unlikely.
fn entry_id(timestamp_ms: i64) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("log_{timestamp_ms}_{}", &suffix[..8])
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeoLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub user_agent: String,
    /// "mobile" or "desktop".
    pub device_type: String,
}

impl DeviceInfo {
    pub fn new(user_agent: impl Into<String>) -> Self {
        let user_agent = user_agent.into();
        let device_type = infer_device_type(&user_agent).to_string();
        Self {
            user_agent,
            device_type,
        }
    }
}

/// Crude device classification from a user-agent string.
pub fn infer_device_type(user_agent: &str) -> &'static str {
    const MOBILE_MARKERS: [&str; 4] = ["Mobile", "Android", "iPhone", "iPad"];
    if MOBILE_MARKERS.iter().any(|m| user_agent.contains(m)) {
        "mobile"
    } else {
        "desktop"
    }
}

/// Capability payload from the backend's health endpoint.
///
/// The backend reports more than this (uptime, paths, restart counters);
/// everything outside the capability contract lands in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    #[serde(default)]
    pub model_loaded: bool,
    #[serde(default)]
    pub known_faces: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_members: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HealthReport {
    /// A backend is usable only when its model is loaded and it knows at
    /// least one face.
    pub fn backend_ready(&self) -> bool {
        self.model_loaded && self.known_faces > 0
    }
}

/// One enrolled entity known to the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterMember {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}

/// Normalized roster of entities the backend can recognize.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Roster {
    pub entities: Vec<RosterMember>,
    pub count: usize,
}

impl Roster {
    pub fn from_entities(entities: Vec<RosterMember>) -> Self {
        let count = entities.len();
        Self {
            entities,
            count,
        }
    }
}

/// Encoded still image, carried as a base64 data URI.
///
/// Produced by an image source (camera capture, file load); this layer
/// never inspects the pixel data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImagePayload(String);

impl ImagePayload {
    /// Wrap an already-encoded `data:` URI.
    pub fn from_data_uri(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    /// Encode raw image bytes as `data:<mime>;base64,<payload>`.
    pub fn from_bytes(mime: &str, bytes: &[u8]) -> Self {
        Self(format!("data:{mime};base64,{}", BASE64.encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Failure crossing the recognizer seam.
///
/// The production client converts transport failures into sentinel
/// outcomes itself, so the orchestrator only ever sees this when
/// something truly unexpected happened; it answers by simulating.
#[derive(Debug, Error)]
pub enum RecognizeError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("internal: {0}")]
    Internal(String),
}

/// Collaborator that turns an image payload into a verification outcome.
///
/// Implementations must not block; the orchestrator treats any `Err` as
/// "backend layer broken" and falls back to local simulation.
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn recognize(&self, image: &ImagePayload)
        -> Result<VerificationOutcome, RecognizeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_sentinel_shape() {
        let o = VerificationOutcome::unreachable("backend unreachable");
        assert!(!o.matched);
        assert_eq!(o.confidence, Some(0.0));
        assert_eq!(o.liveness, Some(0.0));
        assert!(o.identity.is_none());
        assert!(o.reason.as_deref().unwrap().contains("unreachable"));
        assert!(o.is_well_formed());
    }

    #[test]
    fn test_identity_implies_matched_invariant() {
        let mut o = VerificationOutcome::unreachable("x");
        o.identity = Some(IdentityRecord::named("Jane Doe"));
        assert!(!o.is_well_formed());
        o.matched = true;
        assert!(o.is_well_formed());
    }

    #[test]
    fn test_outcome_wire_names() {
        let mut o = VerificationOutcome::unreachable("no backend");
        o.processing_time_ms = Some(42);
        let json = serde_json::to_value(&o).unwrap();
        assert_eq!(json["processing_time"], 42);
        // identity is an explicit null, not omitted
        assert!(json.as_object().unwrap().contains_key("identity"));
        assert!(json["identity"].is_null());
    }

    #[test]
    fn test_identity_extra_fields_round_trip() {
        let raw = serde_json::json!({
            "full_name": "Jane Doe",
            "nin": "12345678901",
            "passport_number": "A50123456",
            "blood_type": "O+"
        });
        let id: IdentityRecord = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(id.full_name, "Jane Doe");
        assert_eq!(id.nin.as_deref(), Some("12345678901"));
        assert_eq!(id.extra["passport_number"], "A50123456");
        let back = serde_json::to_value(&id).unwrap();
        assert_eq!(back["passport_number"], raw["passport_number"]);
        assert_eq!(back["blood_type"], raw["blood_type"]);
    }

    #[test]
    fn test_health_report_readiness() {
        let ready: HealthReport = serde_json::from_value(serde_json::json!({
            "status": "healthy",
            "model_loaded": true,
            "known_faces": 3,
            "team_members": ["Jane_Doe"]
        }))
        .unwrap();
        assert!(ready.backend_ready());
        assert_eq!(ready.extra["status"], "healthy");

        let no_faces: HealthReport = serde_json::from_value(serde_json::json!({
            "model_loaded": true,
            "known_faces": 0
        }))
        .unwrap();
        assert!(!no_faces.backend_ready());
    }

    #[test]
    fn test_image_payload_data_uri() {
        let p = ImagePayload::from_bytes("image/jpeg", b"\xff\xd8\xff");
        assert!(p.as_str().starts_with("data:image/jpeg;base64,"));
        let q = ImagePayload::from_data_uri("data:image/png;base64,AAAA");
        assert_eq!(q.as_str(), "data:image/png;base64,AAAA");
    }

    #[test]
    fn test_entry_id_unique_and_prefixed() {
        let a = entry_id(1_700_000_000_000);
        let b = entry_id(1_700_000_000_000);
        assert!(a.starts_with("log_1700000000000_"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_device_type_inference() {
        assert_eq!(infer_device_type("Mozilla/5.0 (iPhone; ...)"), "mobile");
        assert_eq!(infer_device_type("veriface-cli/0.3.0 (linux)"), "desktop");
    }

    #[test]
    fn test_quality_score_is_mean() {
        let q = ImageQuality {
            brightness: 0.8,
            sharpness: 0.9,
            face_size: 0.6,
            angle_quality: 0.7,
        };
        assert!((q.quality_score() - 0.75).abs() < 1e-9);
    }
}
