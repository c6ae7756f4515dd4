use std::collections::HashMap;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::domain::types::{BodySpec, FormParam, HeaderSpec, UrlObject, UrlSpec};
use crate::engine::env::interpolate;
use crate::error::BodyError;

/// Mirrors `encodeURIComponent`: everything except `A-Z a-z 0-9 - _ . ! ~ * ' ( )`
/// is percent-encoded.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

pub fn encode_component(text: &str) -> String {
    utf8_percent_encode(text, COMPONENT).to_string()
}

/// Supported body serializations. `file` and `graphql` land in the loud arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    Raw,
    Urlencoded,
    FormData,
}

impl BodyMode {
    fn classify(mode: &str) -> Result<BodyMode, BodyError> {
        match mode {
            "raw" => Ok(BodyMode::Raw),
            "urlencoded" => Ok(BodyMode::Urlencoded),
            "formdata" => Ok(BodyMode::FormData),
            other => Err(BodyError::UnsupportedMode(other.to_string())),
        }
    }
}

pub fn build_url(url: &UrlSpec, scope: &HashMap<String, String>) -> String {
    match url {
        UrlSpec::Text(raw) => interpolate(raw, scope),
        UrlSpec::Full(parts) => build_structured_url(parts, scope),
    }
}

fn build_structured_url(url: &UrlObject, scope: &HashMap<String, String>) -> String {
    let mut out = String::new();

    match url.protocol.as_deref() {
        Some(protocol) if !protocol.is_empty() => {
            out.push_str(protocol);
            if !protocol.ends_with("://") {
                out.push_str("://");
            }
        }
        _ => out.push_str("https://"),
    }

    let host: Vec<String> = url.host.iter().map(|seg| interpolate(seg, scope)).collect();
    out.push_str(&host.join("."));

    if !url.path.is_empty() {
        let path: Vec<String> = url.path.iter().map(|seg| interpolate(seg, scope)).collect();
        out.push('/');
        out.push_str(&path.join("/"));
    }

    let pairs: Vec<String> = url
        .query
        .iter()
        .filter(|param| !param.disabled)
        .map(|param| {
            let key = encode_component(&interpolate(&param.key, scope));
            let value = param
                .value
                .as_deref()
                .map(|value| encode_component(&interpolate(value, scope)))
                .unwrap_or_default();
            format!("{key}={value}")
        })
        .collect();
    if !pairs.is_empty() {
        out.push('?');
        out.push_str(&pairs.join("&"));
    }

    out
}

/// Append one more pair to an already-built URL (query-mode API keys).
pub fn append_query(url: &mut String, key: &str, value: &str) {
    let sep = if url.contains('?') { '&' } else { '?' };
    url.push(sep);
    url.push_str(&encode_component(key));
    url.push('=');
    url.push_str(&encode_component(value));
}

/// Enabled headers with `{{var}}` templates resolved in both key and value.
pub fn build_headers(
    headers: &[HeaderSpec],
    scope: &HashMap<String, String>,
) -> HashMap<String, String> {
    headers
        .iter()
        .filter(|header| !header.disabled && !header.key.is_empty())
        .map(|header| {
            (
                interpolate(&header.key, scope),
                interpolate(&header.value, scope),
            )
        })
        .collect()
}

/// Serialize the request body. Form modes default the `Content-Type` header
/// only when the request does not set one itself; formdata file fields have
/// no wire form here and are dropped.
pub fn build_body(
    body: Option<&BodySpec>,
    scope: &HashMap<String, String>,
    headers: &mut HashMap<String, String>,
) -> Result<Option<String>, BodyError> {
    let Some(body) = body else {
        return Ok(None);
    };
    let Some(mode) = body.mode.as_deref().filter(|mode| !mode.is_empty()) else {
        return Ok(None);
    };

    match BodyMode::classify(mode)? {
        BodyMode::Raw => Ok(body.raw.as_deref().map(|raw| interpolate(raw, scope))),
        BodyMode::Urlencoded => {
            let encoded = encode_form(&body.urlencoded, scope, false);
            default_content_type(headers);
            Ok(Some(encoded))
        }
        BodyMode::FormData => {
            let encoded = encode_form(&body.formdata, scope, true);
            default_content_type(headers);
            Ok(Some(encoded))
        }
    }
}

fn encode_form(params: &[FormParam], scope: &HashMap<String, String>, skip_files: bool) -> String {
    params
        .iter()
        .filter(|param| !param.disabled && !(skip_files && param.kind.as_deref() == Some("file")))
        .map(|param| {
            let key = encode_component(&param.key);
            let value = param
                .value
                .as_deref()
                .map(|value| encode_component(&interpolate(value, scope)))
                .unwrap_or_default();
            format!("{key}={value}")
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn default_content_type(headers: &mut HashMap<String, String>) {
    let already_set = headers.keys().any(|key| key.eq_ignore_ascii_case("content-type"));
    if !already_set {
        headers.insert("Content-Type".to_string(), FORM_CONTENT_TYPE.to_string());
    }
}
