use crate::{ClosedTabSnapshot, Tab, TabType};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tabs carry whole files, so frames are allowed to be large.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

/// Server to client push, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    TabCreated { tab: Tab },
    TabUpdated { tab: Tab },
    TabDeleted { id: String },
    TabActivated { id: String },
    TabsCleared,
}

impl ServerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::TabCreated { .. } => "tab_created",
            ServerEvent::TabUpdated { .. } => "tab_updated",
            ServerEvent::TabDeleted { .. } => "tab_deleted",
            ServerEvent::TabActivated { .. } => "tab_activated",
            ServerEvent::TabsCleared => "tabs_cleared",
        }
    }

    pub fn tab_id(&self) -> Option<&str> {
        match self {
            ServerEvent::TabCreated { tab } | ServerEvent::TabUpdated { tab } => Some(&tab.id),
            ServerEvent::TabDeleted { id } | ServerEvent::TabActivated { id } => Some(id),
            ServerEvent::TabsCleared => None,
        }
    }
}

/// Client to server request sent over the websocket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    ActivateTab { id: String },
    CloseTab { id: String },
}

impl ClientRequest {
    pub fn tab_id(&self) -> &str {
        match self {
            ClientRequest::ActivateTab { id } | ClientRequest::CloseTab { id } => id,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DiffRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unified: Option<String>,
    /// Files to compare when `unified` is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Body of `POST /api/tabs`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateTabRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub tab_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<DiffRequest>,
}

impl CreateTabRequest {
    /// Recreates a closed tab under `id`, which should be fresh so it cannot
    /// collide with a tab the server still knows.
    pub fn from_snapshot(snapshot: &ClosedTabSnapshot, id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            title: snapshot.title.clone(),
            tab_type: Some(snapshot.tab_type.as_str().to_string()),
            content: Some(snapshot.content.clone()),
            language: snapshot.language.clone(),
            ..Self::default()
        }
    }

    pub fn parsed_type(&self) -> Result<Option<TabType>, String> {
        match self.tab_type.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => raw.parse().map(Some),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateTabResponse {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub tab_type: TabType,
    pub created: bool,
}

/// Body of `GET /api/tabs`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TabList {
    #[serde(default)]
    pub tabs: Vec<Tab>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub version: String,
    pub tabs: usize,
    pub uptime: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame exceeds max size: {size} > {max}")]
    OversizedFrame { size: usize, max: usize },
    #[error("frame encode failed: {0}")]
    Encode(String),
    #[error("frame decode failed: {0}")]
    Decode(String),
}

pub fn encode_frame<T: Serialize>(value: &T, max_frame_bytes: usize) -> Result<String, FrameError> {
    let encoded = serde_json::to_string(value).map_err(|err| FrameError::Encode(err.to_string()))?;
    if encoded.len() > max_frame_bytes {
        return Err(FrameError::OversizedFrame {
            size: encoded.len(),
            max: max_frame_bytes,
        });
    }
    Ok(encoded)
}

pub fn decode_frame<T: DeserializeOwned>(text: &str, max_frame_bytes: usize) -> Result<T, FrameError> {
    let raw = text.trim_end_matches(['\r', '\n']);
    if raw.len() > max_frame_bytes {
        return Err(FrameError::OversizedFrame {
            size: raw.len(),
            max: max_frame_bytes,
        });
    }
    serde_json::from_str(raw).map_err(|err| FrameError::Decode(err.to_string()))
}
