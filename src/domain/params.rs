//! Multi-valued parameters, as found in query strings and form bodies.

use std::fmt;
use std::ops::Index;

use serde_json::Value;
use url::form_urlencoded;

use crate::domain::errors::{AdapterError, AdapterResult};
use crate::FnvIndexMap;

/// Decodes an `application/x-www-form-urlencoded` string into owned pairs.
///
/// `+` becomes a space and percent escapes are decoded as UTF-8 (lossy).
/// Pairs whose value is empty are dropped unless `keep_blank` is set.
pub fn parse_pairs(input: &str, keep_blank: bool) -> impl Iterator<Item = (String, String)> + '_ {
    form_urlencoded::parse(input.as_bytes())
        .filter(move |(_, value)| keep_blank || !value.is_empty())
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
}

/// Ordered mapping of a key to one or more values.
///
/// Every key holds at least one value. Keys iterate in first-insertion order
/// and values in the order they were supplied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiParams {
    data: FnvIndexMap<String, Vec<String>>,
}

impl MultiParams {
    /// Builds from a mapping of key to list of values.
    ///
    /// Fails when a key maps to an empty list.
    pub fn from_mapping<I, K>(mapping: I) -> AdapterResult<Self>
    where
        I: IntoIterator<Item = (K, Vec<String>)>,
        K: Into<String>,
    {
        let mut data = FnvIndexMap::default();
        for (key, values) in mapping {
            let key = key.into();
            if values.is_empty() {
                return Err(AdapterError::MalformedParams(format!(
                    "key {key:?} has no values"
                )));
            }
            data.insert(key, values);
        }

        Ok(Self { data })
    }

    /// Builds from `(key, value)` pairs, appending repeated keys in order.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut data: FnvIndexMap<String, Vec<String>> = FnvIndexMap::default();
        for (key, value) in pairs {
            data.entry(key.into()).or_default().push(value.into());
        }

        Self { data }
    }

    /// Parses a query string, dropping blank values.
    pub fn from_query(query: &str) -> Self {
        Self::from_pairs(parse_pairs(query, false))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// First value for `key`, failing when the key is absent.
    pub fn get_first(&self, key: &str) -> AdapterResult<&str> {
        self.get(key)
            .ok_or_else(|| AdapterError::MissingKey(key.to_owned()))
    }

    /// First value for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.data
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Every value stored for `key`; empty when the key is absent.
    pub fn get_list(&self, key: &str) -> &[String] {
        self.data.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.data
            .iter()
            .map(|(key, values)| (key.as_str(), values.as_slice()))
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Index<&str> for MultiParams {
    type Output = str;

    fn index(&self, key: &str) -> &str {
        match self.get(key) {
            Some(value) => value,
            None => panic!("no value for key {key:?}"),
        }
    }
}

impl fmt::Display for MultiParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<MultiParams: {:?}>", self.data)
    }
}

/// Accepts either `{"key": ["value", ...]}` or `[["key", "value"], ...]`.
impl TryFrom<Value> for MultiParams {
    type Error = AdapterError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => {
                let mapping = map
                    .into_iter()
                    .map(|(key, values)| match values {
                        Value::Array(items) => items
                            .into_iter()
                            .map(into_text)
                            .collect::<AdapterResult<Vec<_>>>()
                            .map(|values| (key, values)),
                        other => Err(AdapterError::MalformedParams(format!(
                            "dictionary data should map {key:?} to a list, got {other}"
                        ))),
                    })
                    .collect::<AdapterResult<Vec<_>>>()?;

                Self::from_mapping(mapping)
            }
            Value::Array(items) => {
                let pairs = items
                    .into_iter()
                    .map(into_pair)
                    .collect::<AdapterResult<Vec<_>>>()?;

                Ok(Self::from_pairs(pairs))
            }
            other => Err(AdapterError::MalformedParams(format!(
                "expected a dictionary or a list of pairs, got {other}"
            ))),
        }
    }
}

fn into_pair(item: Value) -> AdapterResult<(String, String)> {
    let malformed = |item: &Value| {
        AdapterError::MalformedParams(format!(
            "list data should be a list of [key, value] pairs, got {item}"
        ))
    };

    match item {
        Value::Array(pair) if pair.len() == 2 => {
            let [key, value]: [Value; 2] = pair
                .try_into()
                .map_err(|pair: Vec<Value>| malformed(&Value::Array(pair)))?;
            Ok((into_text(key)?, into_text(value)?))
        }
        other => Err(malformed(&other)),
    }
}

fn into_text(value: Value) -> AdapterResult<String> {
    match value {
        Value::String(text) => Ok(text),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(flag) => Ok(flag.to_string()),
        other => Err(AdapterError::MalformedParams(format!(
            "expected a scalar value, got {other}"
        ))),
    }
}
