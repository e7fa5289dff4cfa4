use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub mod detect;
pub mod diff;
pub mod protocol;

/// Render type of a tab's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TabType {
    Markdown,
    Code,
    Diff,
    Mermaid,
    Image,
    Csv,
    Plain,
}

impl Default for TabType {
    fn default() -> Self {
        Self::Markdown
    }
}

impl TabType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TabType::Markdown => "markdown",
            TabType::Code => "code",
            TabType::Diff => "diff",
            TabType::Mermaid => "mermaid",
            TabType::Image => "image",
            TabType::Csv => "csv",
            TabType::Plain => "plain",
        }
    }

    pub fn is_diff(&self) -> bool {
        matches!(self, TabType::Diff)
    }
}

impl fmt::Display for TabType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TabType {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase();
        match normalized.as_str() {
            "markdown" | "md" => Ok(TabType::Markdown),
            "code" => Ok(TabType::Code),
            "diff" | "patch" => Ok(TabType::Diff),
            "mermaid" => Ok(TabType::Mermaid),
            "image" => Ok(TabType::Image),
            "csv" => Ok(TabType::Csv),
            "plain" | "text" => Ok(TabType::Plain),
            other => Err(format!("Unknown tab type: {other}")),
        }
    }
}

impl Serialize for TabType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// Unknown type names from a newer server degrade to `plain` instead of
/// failing the whole message.
impl<'de> Deserialize<'de> for TabType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or(TabType::Plain))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DiffMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// A unit of content shown in the viewer. Content is replaced wholesale on
/// update, never patched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "type", default)]
    pub tab_type: TabType,
    #[serde(default)]
    pub content: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_text"
    )]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<DiffMeta>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_text"
    )]
    pub source_path: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Tab {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        tab_type: TabType,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            tab_type,
            content: content.into(),
            language: None,
            diff: None,
            source_path: None,
            active: false,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Language used for highlighting, preferring the diff metadata hint.
    pub fn language_hint(&self) -> Option<&str> {
        self.language
            .as_deref()
            .or_else(|| self.diff.as_ref().and_then(|meta| meta.language.as_deref()))
    }

    pub fn snapshot(&self, closed_at: DateTime<Utc>) -> ClosedTabSnapshot {
        ClosedTabSnapshot {
            id: self.id.clone(),
            title: self.title.clone(),
            tab_type: self.tab_type,
            content: self.content.clone(),
            language: self.language.clone(),
            closed_at,
        }
    }
}

/// Copy of a tab taken when it was closed. Lives independently of the tab it
/// was taken from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClosedTabSnapshot {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub tab_type: TabType,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub closed_at: DateTime<Utc>,
}

/// Random 16 hex character tab id.
pub fn generate_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(16);
    id
}

/// Treats a missing, null, or empty string as absent.
fn deserialize_optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|text| !text.is_empty()))
}
