//! Validated pipeline document model.
//!
//! These types are produced by the engine's validator from the raw YAML
//! document and are immutable for the rest of a run. Source and sink
//! variants are closed enums so every compile stage matches exhaustively.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const DEFAULT_CHECKPOINT_DIR: &str = "file:///opt/flink/checkpoint";
pub const DEFAULT_SAVEPOINT_DIR: &str = "file:///opt/flink/savepoint";
pub const DEFAULT_LOOKUP_CACHE_ROWS: u64 = 5000;
pub const DEFAULT_LOOKUP_CACHE_TTL: &str = "240s";

/// A complete, validated pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub name: String,
    pub spec_version: String,
    pub parallelism: u32,
    pub checkpoint_dir: String,
    pub savepoint_dir: String,
    pub sources: Vec<SourceDef>,
    pub transforms: Vec<TransformDef>,
    pub sinks: Vec<SinkDef>,
}

/// A source view over a catalog dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDef {
    pub name: String,
    /// Dataset reference inside the lakehouse catalog (e.g. `chain.blocks`).
    pub dataset: String,
    pub filter: Option<String>,
    pub parallelism: u32,
    pub kind: SourceKind,
}

/// The five source variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceKind {
    Dataset,
    Tumble {
        timecol: String,
        size: String,
        offset: Option<String>,
    },
    Hop {
        timecol: String,
        slide: String,
        size: String,
        offset: Option<String>,
    },
    Cumulate {
        timecol: String,
        step: String,
        size: String,
        offset: Option<String>,
    },
    Lookup(LookupCache),
}

impl SourceKind {
    /// Type tag as written in the pipeline document.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Dataset => "dataset",
            Self::Tumble { .. } => "tumble_window_dataset",
            Self::Hop { .. } => "hop_window_dataset",
            Self::Cumulate { .. } => "cumulative_window_dataset",
            Self::Lookup(_) => "lookup_dataset",
        }
    }
}

/// Point-lookup cache policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupCache {
    pub cache_rows: u64,
    pub cache_ttl: String,
}

impl Default for LookupCache {
    fn default() -> Self {
        Self {
            cache_rows: DEFAULT_LOOKUP_CACHE_ROWS,
            cache_ttl: DEFAULT_LOOKUP_CACHE_TTL.to_string(),
        }
    }
}

/// A SQL transform, optionally templated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformDef {
    pub name: String,
    pub sql: String,
    pub params: Option<BTreeMap<String, serde_json::Value>>,
}

/// A sink bound to a source or transform view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkDef {
    pub name: String,
    pub from: String,
    pub kind: SinkKind,
}

/// The five sink variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SinkKind {
    Postgres(PostgresSink),
    Starrocks(StarRocksSink),
    Print,
    Filesystem { file_name: String },
    Kafka(KafkaSink),
}

impl SinkKind {
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Postgres(_) => "postgres",
            Self::Starrocks(_) => "starrocks",
            Self::Print => "print",
            Self::Filesystem { .. } => "filesystem",
            Self::Kafka(_) => "kafka",
        }
    }
}

/// Username/password pair. `Debug` never prints the password.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostgresSink {
    pub host: String,
    pub port: u16,
    pub credentials: Credentials,
    pub database: String,
    pub schema: String,
    pub table: String,
    pub primary_key: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarRocksSink {
    pub host: String,
    pub query_port: u16,
    pub http_port: u16,
    pub credentials: Credentials,
    pub database: String,
    pub table: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KafkaSink {
    pub topic: String,
    pub bootstrap_servers: String,
    pub truststore_location: Option<String>,
    pub truststore_password: Option<String>,
    pub credentials: Credentials,
    pub format: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_debug_hides_password() {
        let creds = Credentials {
            username: "writer".into(),
            password: "hunter2".into(),
        };
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("writer"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn source_tags_match_document_spelling() {
        let kind = SourceKind::Hop {
            timecol: "ts".into(),
            slide: "1min".into(),
            size: "5min".into(),
            offset: None,
        };
        assert_eq!(kind.tag(), "hop_window_dataset");
        assert_eq!(
            SourceKind::Lookup(LookupCache::default()).tag(),
            "lookup_dataset"
        );
    }

    #[test]
    fn lookup_cache_defaults() {
        let cache = LookupCache::default();
        assert_eq!(cache.cache_rows, 5000);
        assert_eq!(cache.cache_ttl, "240s");
    }
}
