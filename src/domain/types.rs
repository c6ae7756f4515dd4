use serde::{Deserialize, Serialize};

/// Collection v2.1-shaped documents. Every field is defaulted so a partially
/// damaged export still loads; broken nodes degrade when the affected request
/// is built, not at parse time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Collection {
    pub info: CollectionInfo,
    pub item: Vec<Item>,
    pub variable: Vec<CollectionVariable>,
    pub auth: Option<AuthSpec>,
    pub event: Vec<Event>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CollectionInfo {
    pub name: String,
    pub description: Option<String>,
    pub schema: Option<String>,
}

/// Tree node: a folder (has `item`), a request leaf (has `request`), or both.
/// Order within a level is array order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Item {
    pub name: String,
    pub item: Option<Vec<Item>>,
    pub request: Option<RequestSpec>,
    pub event: Vec<Event>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestSpec {
    pub method: String,
    pub header: Vec<HeaderSpec>,
    pub body: Option<BodySpec>,
    pub url: UrlSpec,
    pub auth: Option<AuthSpec>,
    pub description: Option<String>,
}

impl Default for RequestSpec {
    fn default() -> Self {
        Self {
            method: "GET".to_string(),
            header: Vec::new(),
            body: None,
            url: UrlSpec::default(),
            auth: None,
            description: None,
        }
    }
}

/// Exports carry either a plain URL string or the decomposed form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UrlSpec {
    Text(String),
    Full(UrlObject),
}

impl Default for UrlSpec {
    fn default() -> Self {
        UrlSpec::Text(String::new())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UrlObject {
    pub raw: Option<String>,
    pub protocol: Option<String>,
    pub host: Vec<String>,
    pub path: Vec<String>,
    pub query: Vec<QueryParam>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryParam {
    pub key: String,
    pub value: Option<String>,
    pub disabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeaderSpec {
    pub key: String,
    pub value: String,
    pub disabled: bool,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BodySpec {
    pub mode: Option<String>,
    pub raw: Option<String>,
    pub urlencoded: Vec<FormParam>,
    pub formdata: Vec<FormParam>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormParam {
    pub key: String,
    pub value: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub disabled: bool,
}

/// The declared auth scheme plus its parameter lists. Only the schemes the
/// engine applies are modeled; the raw `type` string is kept so unsupported
/// schemes can be named in the error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSpec {
    #[serde(rename = "type")]
    pub kind: String,
    pub bearer: Vec<AuthParam>,
    pub basic: Vec<AuthParam>,
    pub apikey: Vec<AuthParam>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthParam {
    pub key: String,
    pub value: Option<serde_json::Value>,
}

/// A script bound to the `prerequest` or `test` lifecycle point.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Event {
    pub listen: String,
    pub script: Option<ScriptSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScriptSpec {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub exec: ExecSource,
}

/// Real exports use both forms: an array of source lines or one string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExecSource {
    Lines(Vec<String>),
    Inline(String),
}

impl Default for ExecSource {
    fn default() -> Self {
        ExecSource::Lines(Vec::new())
    }
}

impl ExecSource {
    /// Lines are joined with newlines before execution.
    pub fn source(&self) -> String {
        match self {
            ExecSource::Lines(lines) => lines.join("\n"),
            ExecSource::Inline(text) => text.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ExecSource::Lines(lines) => lines.iter().all(|line| line.trim().is_empty()),
            ExecSource::Inline(text) => text.trim().is_empty(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CollectionVariable {
    pub key: String,
    pub value: Option<serde_json::Value>,
    pub disabled: bool,
}

/// A named set of key/value overrides layered on top of collection variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Environment {
    pub name: String,
    pub values: Vec<EnvironmentValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvironmentValue {
    pub key: String,
    pub value: Option<serde_json::Value>,
    /// Absent counts as enabled.
    pub enabled: Option<bool>,
}

/// Exports carry variable and auth parameter values as arbitrary JSON;
/// templates and scripts only ever see strings.
pub(crate) fn value_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}
