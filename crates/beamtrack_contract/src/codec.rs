use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::query::PageMeta;

const META_KEY: &str = "meta";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to parse response document: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("response document has no `{0}` root key")]
    MissingRoot(String),
    #[error("failed to decode `{root}` payload: {source}")]
    Payload {
        root: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode request document: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Wraps a value under its resource root key, e.g. `{"beam": {...}}`.
pub fn encode_document<T: Serialize>(root: &str, value: &T) -> Result<Vec<u8>, CodecError> {
    let payload = serde_json::to_value(value).map_err(CodecError::Encode)?;
    let mut document = Map::new();
    document.insert(root.to_string(), payload);
    serde_json::to_vec(&Value::Object(document)).map_err(CodecError::Encode)
}

pub fn decode_document<T: DeserializeOwned>(root: &str, body: &[u8]) -> Result<T, CodecError> {
    let mut document = parse_object(body)?;
    take_root(&mut document, root)
}

/// Decodes `{"<root>": [...], "meta": {...}}`; a missing `meta` yields empty paging data.
pub fn decode_collection<T: DeserializeOwned>(
    root: &str,
    body: &[u8],
) -> Result<(Vec<T>, PageMeta), CodecError> {
    let mut document = parse_object(body)?;
    let items = take_root(&mut document, root)?;
    let meta = match document.remove(META_KEY) {
        Some(Value::Null) | None => PageMeta::default(),
        Some(raw) => serde_json::from_value(raw).map_err(|source| CodecError::Payload {
            root: META_KEY.to_string(),
            source,
        })?,
    };
    Ok((items, meta))
}

fn parse_object(body: &[u8]) -> Result<Map<String, Value>, CodecError> {
    let value: Value = serde_json::from_slice(body).map_err(CodecError::Parse)?;
    match value {
        Value::Object(document) => Ok(document),
        _ => Err(CodecError::MissingRoot("<object>".to_string())),
    }
}

fn take_root<T: DeserializeOwned>(
    document: &mut Map<String, Value>,
    root: &str,
) -> Result<T, CodecError> {
    let raw = document
        .remove(root)
        .ok_or_else(|| CodecError::MissingRoot(root.to_string()))?;
    serde_json::from_value(raw).map_err(|source| CodecError::Payload {
        root: root.to_string(),
        source,
    })
}
