//! Recognition backend client with health-gated availability.
//!
//! Requests sweep the candidate endpoints in priority order; the first
//! endpoint that answers is remembered and tried first next time.
//! Availability is only ever decided by a health check, never inferred
//! from a recognize call going through.

use crate::endpoints::{self, request_url};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use url::Url;
use veriface_core::{
    HealthReport, ImagePayload, RecognizeError, Recognizer, Roster, RosterMember,
    VerificationOutcome,
};

/// Reason carried by the sentinel outcome when no backend answers.
pub const UNREACHABLE_REASON: &str =
    "Backend service unavailable - please ensure the recognition service is running";

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("http client build failed: {0}")]
    Build(String),
    #[error("all candidate endpoints failed: {0}")]
    Unreachable(String),
}

/// Connectivity policy knobs. Defaults match the documented design
/// targets; tests shrink them.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Fixed candidate list, priority order.
    pub endpoints: Vec<Url>,
    pub health_timeout: Duration,
    pub recognize_timeout: Duration,
    /// Consecutive all-candidate failures before rechecks pause.
    pub max_reconnect_attempts: u32,
    /// How long automatic rechecks stay paused.
    pub retry_cooldown: Duration,
    /// Background poller cadence.
    pub poll_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoints: endpoints::candidate_endpoints(None),
            health_timeout: Duration::from_secs(8),
            recognize_timeout: Duration::from_secs(30),
            max_reconnect_attempts: 3,
            retry_cooldown: Duration::from_secs(30),
            poll_interval: Duration::from_secs(30),
        }
    }
}

/// Point-in-time connectivity snapshot for presentation.
#[derive(Debug, Clone)]
pub struct ConnectionStatus {
    pub available: bool,
    pub last_good: Option<Url>,
    pub reconnect_attempts: u32,
    pub cooldown_active: bool,
}

/// Result of probing one candidate endpoint directly.
#[derive(Debug, Clone)]
pub struct EndpointProbe {
    pub endpoint: Url,
    /// The endpoint answered the health request at all.
    pub reachable: bool,
    /// Model loaded and at least one face enrolled.
    pub ready: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
}

/// Backend acknowledgment for an enrollment upload.
#[derive(Debug, Clone, Deserialize)]
pub struct EnrollAck {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub total_members: Option<u32>,
}

#[derive(Deserialize)]
struct TeamPayload {
    #[serde(default)]
    team_members: Vec<RosterMember>,
}

#[derive(Default)]
struct ConnState {
    last_good: Option<Url>,
    available: bool,
    reconnect_attempts: u32,
    /// Set once reconnect attempts exhaust; automatic rechecks return
    /// early until this deadline passes.
    retry_suspended_until: Option<Instant>,
    /// Most recent successful health payload, kept for roster fallback.
    last_health: Option<HealthReport>,
}

struct Inner {
    http: reqwest::Client,
    config: ClientConfig,
    state: Mutex<ConnState>,
}

/// Clone-safe handle to the shared connectivity state.
#[derive(Clone)]
pub struct RecognitionClient {
    inner: Arc<Inner>,
}

impl RecognitionClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|err| ClientError::Build(err.to_string()))?;
        Ok(Self {
            inner: Arc::new(Inner {
                http,
                config,
                state: Mutex::new(ConnState::default()),
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn status(&self) -> ConnectionStatus {
        let state = self.lock_state();
        ConnectionStatus {
            available: state.available,
            last_good: state.last_good.clone(),
            reconnect_attempts: state.reconnect_attempts,
            cooldown_active: state
                .retry_suspended_until
                .is_some_and(|until| Instant::now() < until),
        }
    }

    /// Probe candidates in priority order until one answers, and derive
    /// availability from its capability payload. While the cooldown is
    /// active this returns without touching the network.
    pub async fn check_health(&self) {
        {
            let mut state = self.lock_state();
            if let Some(until) = state.retry_suspended_until {
                if Instant::now() < until {
                    tracing::debug!("health check skipped, reconnect cooldown active");
                    return;
                }
                state.retry_suspended_until = None;
            }
        }

        let timeout = self.inner.config.health_timeout;
        match self.sweep_get_json::<HealthReport>("health", timeout).await {
            Ok((endpoint, report)) => {
                let available = report.backend_ready();
                tracing::info!(
                    endpoint = %endpoint,
                    available,
                    known_faces = report.known_faces,
                    "health check ok"
                );
                let mut state = self.lock_state();
                state.available = available;
                state.reconnect_attempts = 0;
                state.retry_suspended_until = None;
                state.last_health = Some(report);
            }
            Err(err) => {
                let mut state = self.lock_state();
                state.available = false;
                state.reconnect_attempts += 1;
                if state.reconnect_attempts >= self.inner.config.max_reconnect_attempts {
                    state.retry_suspended_until =
                        Some(Instant::now() + self.inner.config.retry_cooldown);
                    tracing::warn!(
                        attempts = state.reconnect_attempts,
                        cooldown_s = self.inner.config.retry_cooldown.as_secs(),
                        "backend unreachable, pausing automatic rechecks"
                    );
                } else {
                    tracing::warn!(
                        error = %err,
                        attempts = state.reconnect_attempts,
                        "health check failed"
                    );
                }
            }
        }
    }

    /// Submit an image for recognition. Never errors: an unreachable or
    /// failing backend yields the sentinel outcome instead.
    pub async fn recognize(&self, image: &ImagePayload) -> VerificationOutcome {
        if !self.status().available {
            self.check_health().await;
        }
        if !self.status().available {
            return VerificationOutcome::unreachable(UNREACHABLE_REASON);
        }

        let body = serde_json::json!({ "image": image });
        let timeout = self.inner.config.recognize_timeout;
        match self
            .sweep_post_json::<_, VerificationOutcome>("recognize", &body, timeout)
            .await
        {
            Ok((endpoint, outcome)) => {
                tracing::info!(endpoint = %endpoint, matched = outcome.matched, "recognition response");
                outcome
            }
            Err(err) => {
                tracing::warn!(error = %err, "recognize failed, rechecking health in background");
                self.lock_state().available = false;
                let client = self.clone();
                tokio::spawn(async move { client.check_health().await });
                VerificationOutcome::unreachable(UNREACHABLE_REASON)
            }
        }
    }

    /// The roster of entities the backend can recognize. Falls back to
    /// the names in the last health payload when the roster endpoint has
    /// nothing, and to an empty roster when nothing is known at all.
    pub async fn known_entities(&self) -> Roster {
        let timeout = self.inner.config.health_timeout;
        match self.sweep_get_json::<TeamPayload>("team", timeout).await {
            Ok((endpoint, payload)) if !payload.team_members.is_empty() => {
                tracing::debug!(endpoint = %endpoint, count = payload.team_members.len(), "roster fetched");
                Roster::from_entities(payload.team_members)
            }
            Ok(_) => self.roster_from_health(),
            Err(err) => {
                tracing::debug!(error = %err, "roster endpoint failed, using last health payload");
                self.roster_from_health()
            }
        }
    }

    /// Upload a new enrollment. This is an admin surface, not the
    /// verification path, so failures come back to the caller.
    pub async fn enroll(
        &self,
        name: &str,
        image: &ImagePayload,
        team_data: serde_json::Value,
    ) -> Result<EnrollAck, ClientError> {
        let body = serde_json::json!({
            "name": name,
            "image": image,
            "team_data": team_data,
        });
        let timeout = self.inner.config.recognize_timeout;
        let (endpoint, ack) = self
            .sweep_post_json::<_, EnrollAck>("upload_team_member", &body, timeout)
            .await?;
        tracing::info!(endpoint = %endpoint, name, success = ack.success, "enrollment uploaded");
        Ok(ack)
    }

    /// Health-check every candidate independently and report what each
    /// one said. Diagnostic only: does not promote endpoints or change
    /// availability, and ignores the cooldown.
    pub async fn probe_endpoints(&self) -> Vec<EndpointProbe> {
        let mut probes = Vec::with_capacity(self.inner.config.endpoints.len());
        for endpoint in &self.inner.config.endpoints {
            let url = request_url(endpoint, "health");
            let started = Instant::now();
            let result = self
                .inner
                .http
                .get(&url)
                .timeout(self.inner.config.health_timeout)
                .send()
                .await;
            let latency_ms = started.elapsed().as_millis() as u64;
            let probe = match result {
                Ok(resp) if resp.status().is_success() => match resp.json::<HealthReport>().await {
                    Ok(report) => EndpointProbe {
                        endpoint: endpoint.clone(),
                        reachable: true,
                        ready: report.backend_ready(),
                        latency_ms,
                        error: None,
                    },
                    Err(err) => EndpointProbe {
                        endpoint: endpoint.clone(),
                        reachable: true,
                        ready: false,
                        latency_ms,
                        error: Some(format!("malformed health payload: {err}")),
                    },
                },
                Ok(resp) => EndpointProbe {
                    endpoint: endpoint.clone(),
                    reachable: true,
                    ready: false,
                    latency_ms,
                    error: Some(format!("status {}", resp.status())),
                },
                Err(err) => EndpointProbe {
                    endpoint: endpoint.clone(),
                    reachable: false,
                    ready: false,
                    latency_ms,
                    error: Some(err.to_string()),
                },
            };
            probes.push(probe);
        }
        probes
    }

    fn roster_from_health(&self) -> Roster {
        let state = self.lock_state();
        let names = state
            .last_health
            .as_ref()
            .and_then(|h| h.team_members.clone())
            .unwrap_or_default();
        Roster::from_entities(
            names
                .into_iter()
                .map(|name| RosterMember {
                    name,
                    role: None,
                    department: None,
                })
                .collect(),
        )
    }

    async fn sweep_get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        timeout: Duration,
    ) -> Result<(Url, T), ClientError> {
        let order = self.sweep_order();
        let mut last_error = String::from("no candidate endpoints configured");
        for endpoint in order {
            let url = request_url(&endpoint, path);
            let sent = self.inner.http.get(&url).timeout(timeout).send().await;
            match parse_response::<T>(sent).await {
                Ok(parsed) => {
                    self.promote(&endpoint);
                    return Ok((endpoint, parsed));
                }
                Err(err) => {
                    tracing::debug!(endpoint = %endpoint, error = %err, "candidate failed");
                    last_error = format!("{url}: {err}");
                }
            }
        }
        Err(ClientError::Unreachable(last_error))
    }

    async fn sweep_post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<(Url, T), ClientError> {
        let order = self.sweep_order();
        let mut last_error = String::from("no candidate endpoints configured");
        for endpoint in order {
            let url = request_url(&endpoint, path);
            let sent = self
                .inner
                .http
                .post(&url)
                .timeout(timeout)
                .json(body)
                .send()
                .await;
            match parse_response::<T>(sent).await {
                Ok(parsed) => {
                    self.promote(&endpoint);
                    return Ok((endpoint, parsed));
                }
                Err(err) => {
                    tracing::debug!(endpoint = %endpoint, error = %err, "candidate failed");
                    last_error = format!("{url}: {err}");
                }
            }
        }
        Err(ClientError::Unreachable(last_error))
    }

    fn sweep_order(&self) -> Vec<Url> {
        let state = self.lock_state();
        endpoints::sweep_order(&self.inner.config.endpoints, state.last_good.as_ref())
    }

    fn promote(&self, endpoint: &Url) {
        self.lock_state().last_good = Some(endpoint.clone());
    }

    fn lock_state(&self) -> MutexGuard<'_, ConnState> {
        // State is plain bookkeeping, safe to keep after a panicked writer.
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Non-2xx statuses and unparseable bodies fail a candidate exactly like
/// transport errors.
async fn parse_response<T: DeserializeOwned>(
    sent: Result<reqwest::Response, reqwest::Error>,
) -> Result<T, String> {
    let resp = sent.map_err(|err| err.to_string())?;
    let resp = resp.error_for_status().map_err(|err| err.to_string())?;
    resp.json::<T>()
        .await
        .map_err(|err| format!("malformed response: {err}"))
}

#[async_trait]
impl Recognizer for RecognitionClient {
    async fn recognize(
        &self,
        image: &ImagePayload,
    ) -> Result<VerificationOutcome, RecognizeError> {
        Ok(RecognitionClient::recognize(self, image).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Canned single-threaded backend: each route answers with a fixed
    /// status and body, everything else is a 404.
    fn spawn_backend(routes: Vec<(&'static str, u16, String)>) -> Url {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        std::thread::spawn(move || {
            for request in server.incoming_requests() {
                let hit = routes
                    .iter()
                    .find(|(path, _, _)| request.url().starts_with(path));
                let response = match hit {
                    Some((_, status, body)) => tiny_http::Response::from_string(body.clone())
                        .with_status_code(*status),
                    None => tiny_http::Response::from_string("not found").with_status_code(404),
                };
                let _ = request.respond(response);
            }
        });
        Url::parse(&format!("http://{addr}")).unwrap()
    }

    fn ready_health() -> String {
        r#"{"model_loaded": true, "known_faces": 3}"#.to_string()
    }

    fn test_config(endpoints: Vec<Url>) -> ClientConfig {
        ClientConfig {
            endpoints,
            health_timeout: Duration::from_millis(500),
            recognize_timeout: Duration::from_millis(500),
            ..ClientConfig::default()
        }
    }

    fn image() -> ImagePayload {
        ImagePayload::from_data_uri("data:image/jpeg;base64,AAAA")
    }

    #[tokio::test]
    async fn test_health_check_sets_available_and_promotes() {
        let backend = spawn_backend(vec![("/health", 200, ready_health())]);
        let client = RecognitionClient::new(test_config(vec![backend.clone()])).unwrap();
        client.check_health().await;
        let status = client.status();
        assert!(status.available);
        assert_eq!(status.last_good, Some(backend));
        assert_eq!(status.reconnect_attempts, 0);
    }

    #[tokio::test]
    async fn test_health_check_not_ready_backend_stays_unavailable() {
        let backend = spawn_backend(vec![(
            "/health",
            200,
            r#"{"model_loaded": false, "known_faces": 0}"#.to_string(),
        )]);
        let client = RecognitionClient::new(test_config(vec![backend.clone()])).unwrap();
        client.check_health().await;
        let status = client.status();
        assert!(!status.available);
        // The endpoint answered, so it is still the place to try first.
        assert_eq!(status.last_good, Some(backend));
    }

    #[tokio::test]
    async fn test_promoted_endpoint_wins_next_sweep() {
        // First candidate serves recognize but fails health; second serves
        // both. After a health check the second must be tried first.
        let a = spawn_backend(vec![
            ("/health", 500, "broken".to_string()),
            (
                "/recognize",
                200,
                r#"{"matched": true, "confidence": 0.9, "identity": {"full_name": "Server A"}}"#
                    .to_string(),
            ),
        ]);
        let b = spawn_backend(vec![
            ("/health", 200, ready_health()),
            (
                "/recognize",
                200,
                r#"{"matched": true, "confidence": 0.9, "identity": {"full_name": "Server B"}}"#
                    .to_string(),
            ),
        ]);
        let client = RecognitionClient::new(test_config(vec![a, b.clone()])).unwrap();
        client.check_health().await;
        assert_eq!(client.status().last_good, Some(b));

        let outcome = client.recognize(&image()).await;
        assert!(outcome.matched);
        assert_eq!(
            outcome.identity.as_ref().map(|i| i.full_name.as_str()),
            Some("Server B")
        );
    }

    #[tokio::test]
    async fn test_recognize_soft_fails_without_backend() {
        let client = RecognitionClient::new(test_config(vec![])).unwrap();
        let outcome = client.recognize(&image()).await;
        assert!(!outcome.matched);
        assert_eq!(outcome.confidence, Some(0.0));
        assert!(outcome.reason.as_deref().unwrap().contains("unavailable"));
        assert!(outcome.is_well_formed());
        assert!(!client.status().available);
    }

    #[tokio::test]
    async fn test_recognize_returns_backend_outcome_verbatim() {
        let backend = spawn_backend(vec![
            ("/health", 200, ready_health()),
            (
                "/recognize",
                200,
                r#"{"matched": false, "confidence": 0.31, "liveness": 0.9,
                    "reason": "Face match confidence too low", "processing_time": 840}"#
                    .to_string(),
            ),
        ]);
        let client = RecognitionClient::new(test_config(vec![backend])).unwrap();
        let outcome = client.recognize(&image()).await;
        assert!(!outcome.matched);
        assert_eq!(outcome.confidence, Some(0.31));
        assert_eq!(outcome.processing_time_ms, Some(840));
        assert_eq!(
            outcome.reason.as_deref(),
            Some("Face match confidence too low")
        );
    }

    #[tokio::test]
    async fn test_recognize_failure_yields_sentinel() {
        let backend = spawn_backend(vec![
            ("/health", 200, ready_health()),
            ("/recognize", 500, "internal error".to_string()),
        ]);
        let client = RecognitionClient::new(test_config(vec![backend])).unwrap();
        let outcome = client.recognize(&image()).await;
        assert!(!outcome.matched);
        assert_eq!(outcome.reason.as_deref(), Some(UNREACHABLE_REASON));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_pauses_automatic_rechecks() {
        // No candidates at all: every check fails instantly without I/O.
        let config = ClientConfig {
            endpoints: vec![],
            ..ClientConfig::default()
        };
        let client = RecognitionClient::new(config).unwrap();

        for _ in 0..3 {
            client.check_health().await;
        }
        let status = client.status();
        assert!(!status.available);
        assert_eq!(status.reconnect_attempts, 3);
        assert!(status.cooldown_active);

        // Suspended: further checks do not probe or count.
        client.check_health().await;
        assert_eq!(client.status().reconnect_attempts, 3);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(!client.status().cooldown_active);

        // Cooldown over: checking resumes (and fails again).
        client.check_health().await;
        let status = client.status();
        assert_eq!(status.reconnect_attempts, 4);
        assert!(!status.available);
    }

    #[tokio::test]
    async fn test_known_entities_prefers_roster_endpoint() {
        let backend = spawn_backend(vec![(
            "/team",
            200,
            r#"{"team_members": [{"name": "Carol", "role": "Engineer", "department": "R&D"}],
                "total_members": 1}"#
                .to_string(),
        )]);
        let client = RecognitionClient::new(test_config(vec![backend])).unwrap();
        let roster = client.known_entities().await;
        assert_eq!(roster.count, 1);
        assert_eq!(roster.entities[0].name, "Carol");
        assert_eq!(roster.entities[0].role.as_deref(), Some("Engineer"));
    }

    #[tokio::test]
    async fn test_known_entities_falls_back_to_health_names() {
        let backend = spawn_backend(vec![(
            "/health",
            200,
            r#"{"model_loaded": true, "known_faces": 2, "team_members": ["Alice", "Bob"]}"#
                .to_string(),
        )]);
        let client = RecognitionClient::new(test_config(vec![backend])).unwrap();
        client.check_health().await;
        let roster = client.known_entities().await;
        assert_eq!(roster.count, 2);
        assert_eq!(roster.entities[0].name, "Alice");
        assert!(roster.entities[0].role.is_none());
    }

    #[tokio::test]
    async fn test_known_entities_empty_when_nothing_known() {
        let client = RecognitionClient::new(test_config(vec![])).unwrap();
        let roster = client.known_entities().await;
        assert!(roster.entities.is_empty());
        assert_eq!(roster.count, 0);
    }

    #[tokio::test]
    async fn test_enroll_parses_acknowledgment() {
        let backend = spawn_backend(vec![(
            "/upload_team_member",
            200,
            r#"{"success": true, "message": "Team member added", "total_members": 4}"#.to_string(),
        )]);
        let client = RecognitionClient::new(test_config(vec![backend])).unwrap();
        let ack = client
            .enroll("Dana", &image(), serde_json::json!({"role": "Analyst"}))
            .await
            .unwrap();
        assert!(ack.success);
        assert_eq!(ack.total_members, Some(4));
    }

    #[tokio::test]
    async fn test_enroll_surfaces_unreachable_error() {
        let client = RecognitionClient::new(test_config(vec![])).unwrap();
        let err = client
            .enroll("Dana", &image(), serde_json::Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Unreachable(_)));
    }

    #[tokio::test]
    async fn test_probe_endpoints_reports_each_candidate() {
        let live = spawn_backend(vec![("/health", 200, ready_health())]);
        let dead = Url::parse("http://127.0.0.1:9").unwrap();
        let client = RecognitionClient::new(test_config(vec![live.clone(), dead.clone()])).unwrap();
        let probes = client.probe_endpoints().await;
        assert_eq!(probes.len(), 2);
        assert_eq!(probes[0].endpoint, live);
        assert!(probes[0].reachable);
        assert!(probes[0].ready);
        assert!(probes[0].error.is_none());
        assert_eq!(probes[1].endpoint, dead);
        assert!(!probes[1].reachable);
        assert!(probes[1].error.is_some());
        // Diagnostics never touch connectivity state.
        assert!(client.status().last_good.is_none());
    }

    #[tokio::test]
    async fn test_malformed_health_body_fails_candidate() {
        let broken = spawn_backend(vec![("/health", 200, "not json at all".to_string())]);
        let healthy = spawn_backend(vec![("/health", 200, ready_health())]);
        let client =
            RecognitionClient::new(test_config(vec![broken, healthy.clone()])).unwrap();
        client.check_health().await;
        let status = client.status();
        assert!(status.available);
        assert_eq!(status.last_good, Some(healthy));
    }
}
