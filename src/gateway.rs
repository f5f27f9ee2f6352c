//! HTTP gateway to the remote platform services.
//!
//! One gateway instance is bound to one base address: the auth service for
//! account operations, the per-user container API for everything else. Every
//! call returns a tagged [`ApiError`] on failure; nothing here panics or lets
//! a transport fault escape as an unstructured error.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Failures surfaced by the gateway.
#[derive(Debug, Clone)]
pub enum ApiError {
    /// No response reached us (connect failure, timeout, bad body).
    Transport { message: String },
    /// The server answered non-2xx; `message` is the server-supplied error
    /// text when the body carried one.
    Server { status: u16, message: String },
}

impl ApiError {
    fn transport(err: reqwest::Error) -> Self {
        // Strip the URL to keep messages stable and credential-free.
        Self::Transport {
            message: err.without_url().to_string(),
        }
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport { message } => write!(f, "operation failed: {}", message),
            Self::Server { message, .. } => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for ApiError {}

/// Lifecycle commands accepted by the container API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerAction {
    Start,
    Stop,
    Restart,
    Remove,
}

impl ContainerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Remove => "remove",
        }
    }
}

impl Display for ContainerAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Wire types. Field names follow the backend JSON contract.

#[derive(Debug, Clone, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub success: bool,
    pub user: Option<UserRecord>,
    pub redirect_url: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub session_token: String,
}

#[derive(Debug, Clone, Serialize)]
struct ValidateRequest<'a> {
    user_id: &'a str,
    session_token: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidateResponse {
    #[serde(default)]
    pub valid: bool,
}

#[derive(Debug, Clone, Serialize)]
struct LogoutRequest<'a> {
    user_id: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserInfoResponse {
    #[serde(default)]
    pub success: bool,
    pub redirect_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ContainerInfoResponse {
    container: Option<ContainerRecord>,
}

/// A container as reported by the backend. `status` is the canonical
/// running-state field; no other field is consulted.
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
}

impl ContainerRecord {
    pub fn is_running(&self) -> bool {
        self.status == "running"
    }
}

#[derive(Debug, Clone, Serialize)]
struct CreateContainerRequest<'a> {
    user: &'a str,
    session_token: &'a str,
}

/// One stats fetch result. `running == false` tells the poller to stop.
#[derive(Debug, Clone, Deserialize)]
pub struct StatsPayload {
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub stats: ContainerStats,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerStats {
    #[serde(default)]
    pub cpu_usage: f64,
    #[serde(default)]
    pub memory_usage: f64,
    #[serde(default)]
    pub memory_used: u64,
    #[serde(default)]
    pub memory_limit: u64,
}

/// Service ports exposed by a running container. Fetched as a snapshot once
/// the container is confirmed running, never polled.
#[derive(Debug, Clone, Deserialize)]
pub struct PortInfo {
    pub code_port: u16,
    pub ssh_port: u16,
    pub spice_port: u16,
    pub fm_ui_port: u16,
    pub fm_port: u16,
}

/// Command acknowledgements carry no information this client trusts; state is
/// always re-fetched after a mutation.
#[derive(Debug, Clone, Deserialize)]
struct Ack {
    #[serde(default)]
    #[allow(dead_code)]
    success: bool,
}

/// Error body shape used by the backend for non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Account operations against the auth service.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ApiError>;
    async fn validate_session(
        &self,
        user_id: &str,
        session_token: &str,
    ) -> Result<ValidateResponse, ApiError>;
    async fn logout(&self, user_id: &str) -> Result<(), ApiError>;
    async fn get_user(&self, user_id: &str) -> Result<UserInfoResponse, ApiError>;
}

/// Container operations against the per-user container API.
#[async_trait]
pub trait ContainerApi: Send + Sync {
    /// Fetches the container by name; `None` means it has never existed (or
    /// was removed), which is a normal answer, not an error.
    async fn container_info(&self, name: &str) -> Result<Option<ContainerRecord>, ApiError>;
    async fn container_stats(&self, name: &str) -> Result<StatsPayload, ApiError>;
    async fn container_action(&self, name: &str, action: ContainerAction) -> Result<(), ApiError>;
    async fn create_container(&self, user: &str, session_token: &str) -> Result<(), ApiError>;
    async fn container_ports(&self, name: &str) -> Result<PortInfo, ApiError>;
}

/// HTTP client bound to one base address.
#[derive(Debug, Clone)]
pub struct RemoteGateway {
    http: reqwest::Client,
    base_url: String,
}

impl RemoteGateway {
    /// Creates a gateway for `http://host:port` with the given finite timeout.
    pub fn connect(host: &str, port: u16, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: format!("http://{}:{}", host, port),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(ApiError::transport)?;
        Self::decode(response).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let response = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(ApiError::transport)?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let status = response.status();
        if status.is_success() {
            return response.json().await.map_err(ApiError::transport);
        }
        // Surface the server's own message verbatim when the body carries one.
        let message = response
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|body| body.error)
            .unwrap_or_else(|| format!("server returned {}", status));
        Err(ApiError::Server {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl AuthApi for RemoteGateway {
    async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ApiError> {
        self.post("/api/login", &LoginRequest { username, password })
            .await
    }

    async fn validate_session(
        &self,
        user_id: &str,
        session_token: &str,
    ) -> Result<ValidateResponse, ApiError> {
        self.post(
            "/api/validate_session",
            &ValidateRequest {
                user_id,
                session_token,
            },
        )
        .await
    }

    async fn logout(&self, user_id: &str) -> Result<(), ApiError> {
        let _: Ack = self.post("/api/logout", &LogoutRequest { user_id }).await?;
        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> Result<UserInfoResponse, ApiError> {
        self.get(&format!("/api/users/{}", user_id)).await
    }
}

#[async_trait]
impl ContainerApi for RemoteGateway {
    async fn container_info(&self, name: &str) -> Result<Option<ContainerRecord>, ApiError> {
        let response = self
            .http
            .get(self.url(&format!("/api/containers/{}", name)))
            .send()
            .await
            .map_err(ApiError::transport)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let info: ContainerInfoResponse = Self::decode(response).await?;
        Ok(info.container)
    }

    async fn container_stats(&self, name: &str) -> Result<StatsPayload, ApiError> {
        self.get(&format!("/api/containers/{}/stats", name)).await
    }

    async fn container_action(&self, name: &str, action: ContainerAction) -> Result<(), ApiError> {
        let _: Ack = self
            .post(
                &format!("/api/containers/{}/{}", name, action.as_str()),
                &serde_json::json!({}),
            )
            .await?;
        Ok(())
    }

    async fn create_container(&self, user: &str, session_token: &str) -> Result<(), ApiError> {
        let _: Ack = self
            .post(
                "/api/containers",
                &CreateContainerRequest {
                    user,
                    session_token,
                },
            )
            .await?;
        Ok(())
    }

    async fn container_ports(&self, name: &str) -> Result<PortInfo, ApiError> {
        self.get(&format!("/api/containers/{}/ports", name)).await
    }
}
