//! Raw pipeline document shape.
//!
//! Every field is optional so that a missing field surfaces as a
//! field-specific validation error instead of an opaque deserialize error.

use std::collections::BTreeMap;

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPipelineSpec {
    pub name: Option<String>,
    #[serde(rename = "specVersion")]
    pub spec_version: Option<Scalar>,
    pub parallelism: Option<Scalar>,
    pub state_checkpoints_dir: Option<String>,
    pub state_savepoints_dir: Option<String>,
    #[serde(default)]
    pub sources: Vec<RawSource>,
    #[serde(default)]
    pub transforms: Vec<RawTransform>,
    #[serde(default)]
    pub sinks: Vec<RawSink>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSource {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub type_tag: Option<String>,
    pub dataset: Option<String>,
    pub filter: Option<String>,
    pub parallelism: Option<Scalar>,
    pub timecol: Option<String>,
    pub size: Option<Scalar>,
    pub slide: Option<Scalar>,
    pub step: Option<Scalar>,
    pub offset: Option<Scalar>,
    pub lookup: Option<RawLookup>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLookup {
    #[serde(rename = "cache-rows", alias = "cache_rows")]
    pub cache_rows: Option<Scalar>,
    #[serde(rename = "cache-ttl", alias = "cache_ttl")]
    pub cache_ttl: Option<Scalar>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTransform {
    pub name: Option<String>,
    pub sql: Option<String>,
    pub params: Option<BTreeMap<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSink {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub type_tag: Option<String>,
    pub from: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub table: Option<String>,
    pub primary_key: Option<KeyList>,
    pub file_name: Option<String>,
    pub topic: Option<String>,
    pub kafka_servers: Option<String>,
    pub truststore_location: Option<String>,
    pub truststore_password: Option<Scalar>,
    pub format: Option<String>,
    pub query_port: Option<Scalar>,
    pub http_port: Option<Scalar>,
    pub config: Option<RawConnection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConnection {
    pub host: Option<String>,
    pub port: Option<Scalar>,
    pub username: Option<Scalar>,
    pub password: Option<Scalar>,
}

/// A primary key given either as one column or a list of columns.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum KeyList {
    One(String),
    Many(Vec<String>),
}

impl KeyList {
    #[must_use]
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(col) => col
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect(),
            Self::Many(cols) => cols,
        }
    }
}

/// A YAML scalar that the document may spell as a string or a number.
///
/// Substituted placeholders often produce unquoted numbers (`port: 5432`)
/// or booleans, so string-valued fields accept any scalar.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Self::Str(s) => s.clone(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Bool(b) => b.to_string(),
        }
    }

    /// Positive integer value, accepting numeric strings.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Int(i) => u64::try_from(*i).ok(),
            Self::Str(s) => s.trim().parse().ok(),
            Self::Float(_) | Self::Bool(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_accepts_numbers_and_strings() {
        let raw: RawConnection = serde_yaml::from_str("port: 5432\npassword: '007'").unwrap();
        assert_eq!(raw.port.unwrap().as_u64(), Some(5432));
        assert_eq!(raw.password.unwrap().as_text(), "007");
    }

    #[test]
    fn primary_key_accepts_string_or_list() {
        let one: RawSink = serde_yaml::from_str("primary_key: id, day").unwrap();
        assert_eq!(one.primary_key.unwrap().into_vec(), vec!["id", "day"]);

        let many: RawSink = serde_yaml::from_str("primary_key: [id, day]").unwrap();
        assert_eq!(many.primary_key.unwrap().into_vec(), vec!["id", "day"]);
    }

    #[test]
    fn lookup_accepts_hyphenated_keys() {
        let raw: RawSource =
            serde_yaml::from_str("lookup:\n  cache-rows: 100\n  cache-ttl: 10s").unwrap();
        let lookup = raw.lookup.unwrap();
        assert_eq!(lookup.cache_rows.unwrap().as_u64(), Some(100));
        assert_eq!(lookup.cache_ttl.unwrap().as_text(), "10s");
    }
}
