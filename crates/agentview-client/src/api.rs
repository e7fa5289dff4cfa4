//! HTTP side of the hub: bulk load, single fetch, and creation (used by
//! reopen). Requests run on the blocking pool so the event loop never waits.

use agentview_core::protocol::{CreateTabRequest, CreateTabResponse, ErrorResponse, TabList};
use agentview_core::Tab;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use url::Url;

const REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("hub returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("invalid response body: {0}")]
    Decode(String),
    #[error("invalid url: {0}")]
    Url(String),
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Status { status: 404, .. })
    }
}

/// The hub endpoints the client needs. Implemented over HTTP for real use
/// and by in-memory fakes in tests.
pub trait TabApi: Send + Sync + 'static {
    fn list_tabs(&self) -> impl Future<Output = Result<Vec<Tab>, ApiError>> + Send;
    fn get_tab(&self, id: &str) -> impl Future<Output = Result<Tab, ApiError>> + Send;
    fn create_tab(
        &self,
        request: CreateTabRequest,
    ) -> impl Future<Output = Result<CreateTabResponse, ApiError>> + Send;
}

#[derive(Clone)]
pub struct HttpTabApi {
    base: Url,
    agent: ureq::Agent,
}

impl HttpTabApi {
    pub fn new(base: Url) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
            .http_status_as_error(false)
            .build()
            .into();
        Self { base, agent }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base
            .join(path)
            .map_err(|err| ApiError::Url(err.to_string()))
    }

    async fn blocking<T, F>(&self, call: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(ureq::Agent) -> Result<T, ApiError> + Send + 'static,
    {
        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || call(agent))
            .await
            .map_err(|err| ApiError::Transport(err.to_string()))?
    }
}

fn read_response<T: DeserializeOwned>(
    mut response: ureq::http::Response<ureq::Body>,
) -> Result<T, ApiError> {
    let status = response.status().as_u16();
    let body = response
        .body_mut()
        .read_to_string()
        .map_err(|err| ApiError::Transport(err.to_string()))?;
    if !(200..300).contains(&status) {
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .map(|err| err.error)
            .unwrap_or(body);
        return Err(ApiError::Status { status, message });
    }
    serde_json::from_str(&body).map_err(|err| ApiError::Decode(err.to_string()))
}

impl TabApi for HttpTabApi {
    async fn list_tabs(&self) -> Result<Vec<Tab>, ApiError> {
        let url = self.endpoint("/api/tabs")?;
        self.blocking(move |agent| {
            let response = agent
                .get(url.as_str())
                .call()
                .map_err(|err| ApiError::Transport(err.to_string()))?;
            read_response::<TabList>(response).map(|list| list.tabs)
        })
        .await
    }

    async fn get_tab(&self, id: &str) -> Result<Tab, ApiError> {
        let mut url = self.endpoint("/api/tabs/")?;
        url.path_segments_mut()
            .map_err(|_| ApiError::Url(self.base.to_string()))?
            .pop_if_empty()
            .push(id);
        self.blocking(move |agent| {
            let response = agent
                .get(url.as_str())
                .call()
                .map_err(|err| ApiError::Transport(err.to_string()))?;
            read_response(response)
        })
        .await
    }

    async fn create_tab(&self, request: CreateTabRequest) -> Result<CreateTabResponse, ApiError> {
        let url = self.endpoint("/api/tabs")?;
        self.blocking(move |agent| {
            let response = agent
                .post(url.as_str())
                .send_json(&request)
                .map_err(|err| ApiError::Transport(err.to_string()))?;
            read_response(response)
        })
        .await
    }
}

/// `ws://host:port/ws` to `http://host:port/`.
pub fn api_base_from_ws(ws: &Url) -> Result<Url, ApiError> {
    let mut base = ws.clone();
    let scheme = if ws.scheme() == "wss" { "https" } else { "http" };
    base.set_scheme(scheme)
        .map_err(|_| ApiError::Url(ws.to_string()))?;
    base.set_path("/");
    base.set_query(None);
    base.set_fragment(None);
    Ok(base)
}
