//! Authenticated-session lifecycle: login, validation, logout, and the
//! container-API address derivation.
//!
//! The auth service hands back a redirect URL pointing at the agent that owns
//! the user's container; the container API listens one port above it. That
//! +1 offset is a fixed contract between the two backend services.

use crate::gateway::{ApiError, AuthApi};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// A host and port pair, usually the derived container-API address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPort {
    pub host: String,
    pub port: u16,
}

impl Display for HostPort {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// An authenticated session. Exists from a successful login until logout or a
/// failed server-side validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub username: String,
    pub session_token: String,
    /// Derived container-API address; absent when the server supplied no
    /// redirect URL.
    #[serde(default)]
    pub container_api: Option<HostPort>,
}

/// Why a login did not produce a session.
#[derive(Debug, Clone)]
pub enum AuthFailure {
    /// The server rejected the credentials; `message` is its text verbatim.
    Rejected { message: String },
    /// The auth service could not be reached.
    Unreachable { message: String },
}

impl Display for AuthFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rejected { message } => write!(f, "{}", message),
            Self::Unreachable { message } => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for AuthFailure {}

impl From<ApiError> for AuthFailure {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Server { message, .. } => Self::Rejected { message },
            ApiError::Transport { .. } => Self::Unreachable {
                message: "Failed to log in".to_string(),
            },
        }
    }
}

/// Owns the auth-service gateway and the session lifecycle.
pub struct SessionManager<A: AuthApi> {
    api: Arc<A>,
}

impl<A: AuthApi> SessionManager<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self { api }
    }

    /// Logs in and resolves the container-API address.
    ///
    /// The redirect URL may arrive on the login response itself or on the
    /// subsequent user-info fetch; the first one present wins. A session
    /// without a resolvable address is still a valid session.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, AuthFailure> {
        let response = self.api.login(username, password).await?;
        if !response.success {
            let message = response
                .error
                .unwrap_or_else(|| "Login failed".to_string());
            return Err(AuthFailure::Rejected { message });
        }
        let user = response.user.ok_or_else(|| AuthFailure::Rejected {
            message: "Login failed".to_string(),
        })?;

        let mut session = Session {
            user_id: user.id,
            username: user.username,
            session_token: user.session_token,
            container_api: response
                .redirect_url
                .as_deref()
                .and_then(resolve_container_api_address),
        };
        if session.container_api.is_none() {
            session.container_api = self.fetch_redirect_address(&session.user_id).await;
        }
        Ok(session)
    }

    /// Re-checks the session token server-side. Advisory: any failure reads
    /// as "not validated" and sends the caller back to the login screen, it
    /// never takes the process down.
    pub async fn validate(&self, session: &Session) -> bool {
        match self
            .api
            .validate_session(&session.user_id, &session.session_token)
            .await
        {
            Ok(response) => response.valid,
            Err(err) => {
                tracing::warn!("Session validation failed: {}", err);
                false
            }
        }
    }

    /// Best-effort remote invalidation. The caller clears local state no
    /// matter what this returns, so a failed remote call is only logged.
    pub async fn logout(&self, session: &Session) {
        if let Err(err) = self.api.logout(&session.user_id).await {
            tracing::warn!("Remote logout failed: {}", err);
        }
    }

    async fn fetch_redirect_address(&self, user_id: &str) -> Option<HostPort> {
        match self.api.get_user(user_id).await {
            Ok(info) if info.success => info
                .redirect_url
                .as_deref()
                .and_then(resolve_container_api_address),
            Ok(_) => None,
            Err(err) => {
                tracing::warn!("User info fetch failed: {}", err);
                None
            }
        }
    }
}

/// Parses a server redirect URL and derives the container-API address as the
/// redirect host with port + 1. Returns `None` for anything unparsable or a
/// URL without an explicit port.
pub fn resolve_container_api_address(redirect_url: &str) -> Option<HostPort> {
    let url = reqwest::Url::parse(redirect_url).ok()?;
    let host = url.host_str()?.to_string();
    let port = url.port()?.checked_add(1)?;
    Some(HostPort { host, port })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{LoginResponse, UserInfoResponse, UserRecord, ValidateResponse};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn redirect_port_is_offset_by_one() {
        let address = resolve_container_api_address("http://10.0.0.5:8500").unwrap();
        assert_eq!(
            address,
            HostPort {
                host: "10.0.0.5".to_string(),
                port: 8501
            }
        );
    }

    #[test]
    fn redirect_without_explicit_port_resolves_to_none() {
        assert!(resolve_container_api_address("http://10.0.0.5").is_none());
    }

    #[test]
    fn garbage_redirect_resolves_to_none() {
        assert!(resolve_container_api_address("not a url").is_none());
        assert!(resolve_container_api_address("").is_none());
    }

    #[test]
    fn redirect_at_max_port_does_not_wrap() {
        assert!(resolve_container_api_address("http://10.0.0.5:65535").is_none());
    }

    /// Auth API stub returning canned responses and counting calls.
    struct StubAuth {
        login: Result<LoginResponse, ApiError>,
        valid: Result<ValidateResponse, ApiError>,
        logout: Result<(), ApiError>,
        user_info_calls: AtomicU64,
    }

    impl StubAuth {
        fn with_login(login: Result<LoginResponse, ApiError>) -> Self {
            Self {
                login,
                valid: Ok(ValidateResponse { valid: true }),
                logout: Ok(()),
                user_info_calls: AtomicU64::new(0),
            }
        }
    }

    #[async_trait]
    impl AuthApi for StubAuth {
        async fn login(&self, _: &str, _: &str) -> Result<LoginResponse, ApiError> {
            self.login.clone()
        }

        async fn validate_session(&self, _: &str, _: &str) -> Result<ValidateResponse, ApiError> {
            self.valid.clone()
        }

        async fn logout(&self, _: &str) -> Result<(), ApiError> {
            self.logout.clone()
        }

        async fn get_user(&self, _: &str) -> Result<UserInfoResponse, ApiError> {
            self.user_info_calls.fetch_add(1, Ordering::SeqCst);
            Ok(UserInfoResponse {
                success: true,
                redirect_url: Some("http://10.0.0.6:9000".to_string()),
            })
        }
    }

    fn alice() -> UserRecord {
        UserRecord {
            id: "7".to_string(),
            username: "alice".to_string(),
            session_token: "tok".to_string(),
        }
    }

    #[tokio::test]
    async fn login_uses_redirect_from_login_response() {
        let stub = StubAuth::with_login(Ok(LoginResponse {
            success: true,
            user: Some(alice()),
            redirect_url: Some("http://10.0.0.5:8500".to_string()),
            error: None,
        }));
        let manager = SessionManager::new(Arc::new(stub));

        let session = manager.login("alice", "pw").await.unwrap();
        assert_eq!(session.username, "alice");
        assert_eq!(
            session.container_api,
            Some(HostPort {
                host: "10.0.0.5".to_string(),
                port: 8501
            })
        );
        assert_eq!(
            manager.api.user_info_calls.load(Ordering::SeqCst),
            0,
            "redirect came from login, user info should not be fetched"
        );
    }

    #[tokio::test]
    async fn login_falls_back_to_user_info_redirect() {
        let stub = StubAuth::with_login(Ok(LoginResponse {
            success: true,
            user: Some(alice()),
            redirect_url: None,
            error: None,
        }));
        let manager = SessionManager::new(Arc::new(stub));

        let session = manager.login("alice", "pw").await.unwrap();
        assert_eq!(
            session.container_api,
            Some(HostPort {
                host: "10.0.0.6".to_string(),
                port: 9001
            })
        );
        assert_eq!(manager.api.user_info_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejected_login_surfaces_server_message_verbatim() {
        let stub = StubAuth::with_login(Err(ApiError::Server {
            status: 401,
            message: "Invalid credentials".to_string(),
        }));
        let manager = SessionManager::new(Arc::new(stub));

        let err = manager.login("alice", "wrong").await.unwrap_err();
        match err {
            AuthFailure::Rejected { message } => assert_eq!(message, "Invalid credentials"),
            other => panic!("expected Rejected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unsuccessful_body_without_message_gets_generic_failure() {
        let stub = StubAuth::with_login(Ok(LoginResponse {
            success: false,
            user: None,
            redirect_url: None,
            error: None,
        }));
        let manager = SessionManager::new(Arc::new(stub));

        let err = manager.login("alice", "pw").await.unwrap_err();
        assert_eq!(err.to_string(), "Login failed");
    }

    #[tokio::test]
    async fn validation_error_reads_as_not_validated() {
        let mut stub = StubAuth::with_login(Err(ApiError::Transport {
            message: "unused".to_string(),
        }));
        stub.valid = Err(ApiError::Transport {
            message: "connection refused".to_string(),
        });
        let manager = SessionManager::new(Arc::new(stub));
        let session = Session {
            user_id: "7".to_string(),
            username: "alice".to_string(),
            session_token: "tok".to_string(),
            container_api: None,
        };

        assert!(!manager.validate(&session).await);
    }
}
