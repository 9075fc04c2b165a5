//! Auth/API collaborator client
//!
//! Thin wrapper over the external API server: bearer-token login and the
//! camera records the viewer needs to know which ids exist and whether they
//! are enabled for viewing. Camera/user/server CRUD stays on the server side.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::ApiConfig;
use crate::error::{Result, ViewerError};
use crate::signaling::CameraSource;

/// Camera record served by the API collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Camera {
    pub id: String,
    pub name: String,
    pub rtsp_url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub enabled: bool,
    #[serde(default)]
    pub resolution_width: u32,
    #[serde(default)]
    pub resolution_height: u32,
    #[serde(default)]
    pub framerate: u32,
}

impl Camera {
    /// Connection source for the signaling offer
    pub fn source(&self) -> CameraSource {
        CameraSource {
            id: self.id.clone(),
            rtsp_url: Some(self.rtsp_url.clone()),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

/// API server client
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| ViewerError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: RwLock::new(None),
        })
    }

    /// Log in and keep the issued bearer token for subsequent calls
    pub async fn login(&self, email: &str, password: &str) -> Result<()> {
        let url = format!("{}/auth/login", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&LoginRequest { email, password })
            .send()
            .await
            .map_err(|e| ViewerError::Api(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ViewerError::Auth(format!(
                "login failed with HTTP {}",
                response.status()
            )));
        }

        let login: LoginResponse = response
            .json()
            .await
            .map_err(|e| ViewerError::Api(format!("malformed login response: {}", e)))?;

        debug!("Logged in to API server");
        *self.token.write() = Some(login.token);
        Ok(())
    }

    /// Bearer token issued at login, if any
    pub fn bearer_token(&self) -> Option<String> {
        self.token.read().clone()
    }

    /// List the camera records the account can view
    pub async fn list_cameras(&self) -> Result<Vec<Camera>> {
        let url = format!("{}/cameras", self.base_url);
        let mut request = self.http.get(&url);
        if let Some(token) = self.bearer_token() {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ViewerError::Api(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ViewerError::Api(format!(
                "camera list failed with HTTP {}",
                response.status()
            )));
        }

        let cameras: Vec<Camera> = response
            .json()
            .await
            .map_err(|e| ViewerError::Api(format!("malformed camera list: {}", e)))?;

        debug!(count = cameras.len(), "Loaded camera list");
        Ok(cameras)
    }
}
