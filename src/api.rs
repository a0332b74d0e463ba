//! Data-fetch collaborator: the root dialog list and per-root hierarchies.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, FetchError};
use crate::model::{DialogHierarchy, DialogId, DialogNode};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait DialogApi: Send + Sync {
    async fn fetch_roots(&self) -> Result<Vec<DialogNode>, FetchError>;

    async fn fetch_hierarchy(&self, root_id: &DialogId) -> Result<DialogHierarchy, FetchError>;
}

#[derive(Debug, Deserialize)]
struct RootsResponse {
    dialogs: Vec<DialogNode>,
}

/// HTTP implementation against the workspace backend.
#[derive(Debug, Clone)]
pub struct HttpDialogApi {
    base_url: String,
    token: Option<String>,
    timeout: Duration,
    http: reqwest::Client,
}

impl HttpDialogApi {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
            timeout: DEFAULT_TIMEOUT,
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T>(&self, path: &str) -> Result<T, FetchError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "GET");
        let mut request = self.http.get(url.as_str()).timeout(self.timeout);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        decode_json_response(response).await
    }
}

async fn decode_json_response<T>(response: reqwest::Response) -> Result<T, FetchError>
where
    T: for<'de> Deserialize<'de>,
{
    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(FetchError::Unauthorized);
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|e| FetchError::Transport(e.to_string()))?;
    if !status.is_success() {
        let body = String::from_utf8_lossy(&bytes).trim().to_string();
        return Err(FetchError::Http {
            status: status.as_u16(),
            message: if body.is_empty() { "<empty>".to_string() } else { body },
        });
    }
    serde_json::from_slice::<T>(&bytes).map_err(|e| FetchError::Decode(e.to_string()))
}

#[async_trait]
impl DialogApi for HttpDialogApi {
    async fn fetch_roots(&self) -> Result<Vec<DialogNode>, FetchError> {
        let response: RootsResponse = self.get_json("/api/dialogs").await?;
        Ok(response.dialogs)
    }

    async fn fetch_hierarchy(&self, root_id: &DialogId) -> Result<DialogHierarchy, FetchError> {
        self.get_json(&format!("/api/dialogs/{root_id}/hierarchy")).await
    }
}

/// Canned backend state, loaded from a JSON file or built in tests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureApi {
    #[serde(default)]
    pub roots: Vec<DialogNode>,
    #[serde(default)]
    pub hierarchies: BTreeMap<DialogId, Vec<DialogNode>>,
    /// Every fetch fails as unauthenticated.
    #[serde(default)]
    pub unauthorized: bool,
}

impl FixtureApi {
    pub fn new(roots: Vec<DialogNode>) -> Self {
        Self {
            roots,
            ..Self::default()
        }
    }

    pub fn with_subdialogs(mut self, root_id: impl Into<DialogId>, subdialogs: Vec<DialogNode>) -> Self {
        self.hierarchies.insert(root_id.into(), subdialogs);
        self
    }

    pub fn unauthorized(mut self) -> Self {
        self.unauthorized = true;
        self
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Json {
            path: path.display().to_string(),
            source,
        })
    }
}

#[async_trait]
impl DialogApi for FixtureApi {
    async fn fetch_roots(&self) -> Result<Vec<DialogNode>, FetchError> {
        if self.unauthorized {
            return Err(FetchError::Unauthorized);
        }
        Ok(self.roots.clone())
    }

    async fn fetch_hierarchy(&self, root_id: &DialogId) -> Result<DialogHierarchy, FetchError> {
        if self.unauthorized {
            return Err(FetchError::Unauthorized);
        }
        let root = self
            .roots
            .iter()
            .find(|node| &node.root_id == root_id && node.is_root())
            .cloned()
            .ok_or_else(|| FetchError::Http {
                status: 404,
                message: format!("dialog {root_id} not found"),
            })?;
        Ok(DialogHierarchy {
            root,
            subdialogs: self.hierarchies.get(root_id).cloned().unwrap_or_default(),
        })
    }
}
