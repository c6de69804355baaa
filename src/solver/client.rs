//! JSON-over-HTTP client for the external challenge-solver service.
//!
//! The solver drives its own headless browser to clear bot-protection
//! challenges and hands back solved HTML plus the cookie set and user agent
//! it ended up with. This client owns one solver session at a time and
//! recovers from ban-like responses by rotating identity.

use std::sync::Mutex as StdMutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::user_agent::UserAgentPool;

/// Solver request timeout. Challenge solving can take a while; the solver
/// itself is given two minutes per request.
pub const SOLVE_TIMEOUT: Duration = Duration::from_secs(120);

/// Substrings that mark a solver error as ban-like. Checked only against
/// messages of failed responses, so benign session-lifecycle text on
/// successful responses never triggers rotation.
const BAN_MARKERS: &[&str] = &["session", "ban", "block", "403", "captcha", "challenge"];

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("solver unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),
    #[error("solver rejected request: {0}")]
    Rejected(String),
    #[error("solver ban-like response: {0}")]
    BanLike(String),
    #[error("no solver session")]
    NoSession,
}

/// Whether a failed solver message looks like a ban/block/challenge.
pub fn is_ban_like(message: &str) -> bool {
    let lower = message.to_lowercase();
    BAN_MARKERS.iter().any(|marker| lower.contains(marker))
}

#[derive(Debug, Serialize)]
struct SolverRequest<'a> {
    cmd: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    session: Option<&'a str>,
    #[serde(rename = "maxTimeout", skip_serializing_if = "Option::is_none")]
    max_timeout: Option<u64>,
    #[serde(rename = "userAgent", skip_serializing_if = "Option::is_none")]
    user_agent: Option<&'a str>,
}

/// One cookie from the solver's solution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverCookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Default, Deserialize)]
struct SolverSolution {
    #[serde(default)]
    url: String,
    #[serde(default)]
    status: u16,
    #[serde(default)]
    response: String,
    #[serde(default)]
    cookies: Vec<SolverCookie>,
    #[serde(rename = "userAgent", default)]
    user_agent: String,
}

#[derive(Debug, Deserialize)]
struct SolverResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    session: Option<String>,
    #[serde(default)]
    solution: Option<SolverSolution>,
}

impl SolverResponse {
    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// A solved page: HTML body plus the identity the solver actually used.
#[derive(Debug, Clone)]
pub struct SolvedPage {
    pub html: String,
    pub cookies: Vec<SolverCookie>,
    pub user_agent: String,
    pub status: u16,
    pub final_url: String,
}

/// Client for one solver session.
pub struct SolverClient {
    http: reqwest::Client,
    endpoint: String,
    base_url: String,
    session_id: Mutex<Option<String>>,
    user_agents: UserAgentPool,
    current_user_agent: StdMutex<String>,
}

impl SolverClient {
    /// Create a client for the solver at `base_url` (e.g. `http://localhost:8191`).
    pub fn new(base_url: &str) -> Result<Self, SolverError> {
        let http = reqwest::Client::builder()
            .timeout(SOLVE_TIMEOUT + Duration::from_secs(10))
            .build()?;
        let user_agents = UserAgentPool::new();
        let current = user_agents.current().to_string();
        Ok(Self {
            http,
            endpoint: format!("{}/v1", base_url.trim_end_matches('/')),
            base_url: base_url.trim_end_matches('/').to_string(),
            session_id: Mutex::new(None),
            user_agents,
            current_user_agent: StdMutex::new(current),
        })
    }

    /// The user agent bound to the current session.
    pub fn user_agent(&self) -> String {
        self.current_user_agent.lock().unwrap().clone()
    }

    fn set_user_agent(&self, ua: &str) {
        *self.current_user_agent.lock().unwrap() = ua.to_string();
    }

    /// Trivial reachability probe. A "method not allowed" answer still counts:
    /// the solver only speaks POST on its command endpoint.
    pub async fn test_connection(&self) -> bool {
        match self.http.get(&self.base_url).send().await {
            Ok(resp) => {
                resp.status().is_success()
                    || resp.status() == reqwest::StatusCode::METHOD_NOT_ALLOWED
            }
            Err(_) => false,
        }
    }

    async fn send(&self, request: &SolverRequest<'_>) -> Result<SolverResponse, SolverError> {
        let resp = self
            .http
            .post(&self.endpoint)
            .json(request)
            .send()
            .await?
            .json::<SolverResponse>()
            .await?;
        Ok(resp)
    }

    /// Create a fresh solver session bound to the current user agent.
    pub async fn create_session(&self) -> Result<(), SolverError> {
        let ua = self.user_agent();
        let resp = self
            .send(&SolverRequest {
                cmd: "sessions.create",
                url: None,
                session: None,
                max_timeout: None,
                user_agent: Some(&ua),
            })
            .await?;

        if !resp.is_ok() {
            return Err(self.classify_failure(resp.message));
        }
        let session = resp.session.ok_or(SolverError::NoSession)?;
        info!(session = %session, "solver session created");
        *self.session_id.lock().await = Some(session);
        Ok(())
    }

    /// Destroy the current solver session. Idempotent.
    pub async fn destroy_session(&self) -> Result<(), SolverError> {
        let session = self.session_id.lock().await.take();
        let Some(session) = session else {
            return Ok(());
        };
        let result = self
            .send(&SolverRequest {
                cmd: "sessions.destroy",
                url: None,
                session: Some(&session),
                max_timeout: None,
                user_agent: None,
            })
            .await;
        match result {
            Ok(resp) if resp.is_ok() => debug!(session = %session, "solver session destroyed"),
            Ok(resp) => warn!(message = %resp.message, "solver session destroy rejected"),
            Err(e) => warn!(error = %e, "solver session destroy failed"),
        }
        Ok(())
    }

    /// Fetch a page through the solver session.
    ///
    /// Ban-like failures trigger a single in-method recovery: destroy the
    /// session, rotate the user agent, create a new session, retry once.
    pub async fn get_page(&self, url: &str) -> Result<SolvedPage, SolverError> {
        match self.get_page_once(url).await {
            Ok(page) => Ok(page),
            Err(SolverError::BanLike(message)) => {
                warn!(%url, %message, "ban-like solver response, rotating session");
                self.destroy_session().await?;
                self.set_user_agent(self.user_agents.rotate());
                self.create_session().await?;
                self.get_page_once(url).await
            }
            Err(e) => Err(e),
        }
    }

    async fn get_page_once(&self, url: &str) -> Result<SolvedPage, SolverError> {
        let session = self
            .session_id
            .lock()
            .await
            .clone()
            .ok_or(SolverError::NoSession)?;
        let ua = self.user_agent();

        let resp = self
            .send(&SolverRequest {
                cmd: "request.get",
                url: Some(url),
                session: Some(&session),
                max_timeout: Some(SOLVE_TIMEOUT.as_millis() as u64),
                user_agent: Some(&ua),
            })
            .await?;

        if !resp.is_ok() {
            return Err(self.classify_failure(resp.message));
        }
        let solution = resp.solution.unwrap_or_default();
        // Track the UA the solver actually used so the browser capture and
        // download headers present the same identity.
        if !solution.user_agent.is_empty() {
            self.set_user_agent(&solution.user_agent);
        }
        Ok(SolvedPage {
            html: solution.response,
            cookies: solution.cookies,
            user_agent: self.user_agent(),
            status: solution.status,
            final_url: solution.url,
        })
    }

    fn classify_failure(&self, message: String) -> SolverError {
        if is_ban_like(&message) {
            SolverError::BanLike(message)
        } else {
            SolverError::Rejected(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ban_like_markers() {
        assert!(is_ban_like("Cloudflare challenge failed (captcha)"));
        assert!(is_ban_like("HTTP 403 Forbidden"));
        assert!(is_ban_like("Session was destroyed by remote"));
        assert!(is_ban_like("request BLOCKED by upstream"));
        assert!(!is_ban_like("timeout waiting for page load"));
        assert!(!is_ban_like("connection reset by peer"));
    }

    #[test]
    fn test_solver_response_parses_solution() {
        let raw = r#"{
            "status": "ok",
            "message": "",
            "session": "abc-123",
            "solution": {
                "url": "https://example/post/X1",
                "status": 200,
                "response": "<html></html>",
                "cookies": [{"name": "cf", "value": "tok", "domain": ".example"}],
                "userAgent": "Mozilla/5.0 Test"
            }
        }"#;
        let resp: SolverResponse = serde_json::from_str(raw).unwrap();
        assert!(resp.is_ok());
        let solution = resp.solution.unwrap();
        assert_eq!(solution.status, 200);
        assert_eq!(solution.cookies[0].name, "cf");
        assert_eq!(solution.user_agent, "Mozilla/5.0 Test");
    }

    #[test]
    fn test_solver_response_tolerates_missing_fields() {
        let resp: SolverResponse = serde_json::from_str(r#"{"status": "error"}"#).unwrap();
        assert!(!resp.is_ok());
        assert!(resp.solution.is_none());
    }
}
