//! The inbound gateway event describing one request.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::FnvIndexMap;

/// Connection and request metadata handed over by the gateway.
///
/// Byte fields deserialize from either an array of octets or a string. A
/// byte `path` must be valid UTF-8 or deserialization fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    #[serde(rename = "type", default = "http_kind")]
    pub kind: String,
    #[serde(default)]
    pub http_version: Option<String>,
    pub method: String,
    #[serde(deserialize_with = "utf8_text")]
    pub path: String,
    #[serde(default, deserialize_with = "optional_octets")]
    pub raw_path: Option<Vec<u8>>,
    #[serde(default, deserialize_with = "octets")]
    pub query_string: Vec<u8>,
    #[serde(default)]
    pub scheme: Option<String>,
    #[serde(default, deserialize_with = "header_pairs")]
    pub headers: Vec<(Vec<u8>, Vec<u8>)>,
    #[serde(default)]
    pub actor: Option<Value>,
    #[serde(default)]
    pub url_route: Option<UrlRoute>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UrlRoute {
    /// Path variables captured by the router.
    #[serde(default)]
    pub kwargs: FnvIndexMap<String, String>,
}

impl Scope {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            kind: http_kind(),
            http_version: Some("1.1".to_owned()),
            method: method.into(),
            path: path.into(),
            raw_path: None,
            query_string: Vec::new(),
            scheme: None,
            headers: Vec::new(),
            actor: None,
            url_route: None,
        }
    }

    pub fn with_raw_path(mut self, raw_path: impl Into<Vec<u8>>) -> Self {
        self.raw_path = Some(raw_path.into());
        self
    }

    pub fn with_query_string(mut self, query_string: impl Into<Vec<u8>>) -> Self {
        self.query_string = query_string.into();
        self
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }

    /// Appends a raw header; repeated names are kept as separate entries.
    pub fn with_header(mut self, name: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_actor(mut self, actor: Value) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn with_url_vars<I, K, V>(mut self, kwargs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let kwargs = kwargs
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        self.url_route = Some(UrlRoute { kwargs });
        self
    }
}

/// One byte per character, so decoding never fails and round-trips.
pub fn latin1_decode(bytes: &[u8]) -> String {
    bytes.iter().copied().map(char::from).collect()
}

/// `None` when `text` holds a character above U+00FF.
pub fn latin1_encode(text: &str) -> Option<Vec<u8>> {
    text.chars().map(|c| u8::try_from(c).ok()).collect()
}

fn http_kind() -> String {
    "http".to_owned()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Octets {
    Text(String),
    Bytes(Vec<u8>),
}

impl From<Octets> for Vec<u8> {
    fn from(value: Octets) -> Self {
        match value {
            Octets::Text(text) => latin1_encode(&text).unwrap_or_else(|| text.into_bytes()),
            Octets::Bytes(bytes) => bytes,
        }
    }
}

fn utf8_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Octets::deserialize(deserializer)? {
        Octets::Text(text) => Ok(text),
        Octets::Bytes(bytes) => String::from_utf8(bytes).map_err(D::Error::custom),
    }
}

fn octets<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    Ok(optional_octets(deserializer)?.unwrap_or_default())
}

fn optional_octets<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Vec<u8>>, D::Error> {
    Ok(Option::<Octets>::deserialize(deserializer)?.map(Vec::from))
}

fn header_pairs<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<(Vec<u8>, Vec<u8>)>, D::Error> {
    let pairs = Option::<Vec<(Octets, Octets)>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(pairs
        .into_iter()
        .map(|(name, value)| (name.into(), value.into()))
        .collect())
}
