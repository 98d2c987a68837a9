//! Semantic validation of the raw pipeline document.
//!
//! Field errors are collected across the whole document and reported
//! together. An unrecognized source or sink type fails immediately with
//! its dedicated error.

use std::collections::HashSet;

use manuscript_types::spec::{
    Credentials, KafkaSink, LookupCache, PostgresSink, StarRocksSink, DEFAULT_CHECKPOINT_DIR,
    DEFAULT_SAVEPOINT_DIR,
};
use manuscript_types::{PipelineSpec, SinkDef, SinkKind, SourceDef, SourceKind, TransformDef};

use crate::config::types::{RawConnection, RawPipelineSpec, RawSink, RawSource, RawTransform, Scalar};
use crate::error::PipelineError;

const DEFAULT_POSTGRES_PORT: u16 = 5432;
const DEFAULT_STARROCKS_HOST: &str = "localhost";
const DEFAULT_STARROCKS_QUERY_PORT: u16 = 9030;
const DEFAULT_STARROCKS_HTTP_PORT: u16 = 8030;
const DEFAULT_KAFKA_FORMAT: &str = "json";

const SOURCE_TAGS: &[&str] = &[
    "dataset",
    "tumble_window_dataset",
    "hop_window_dataset",
    "cumulative_window_dataset",
    "lookup_dataset",
];
const SINK_TAGS: &[&str] = &["postgres", "starrocks", "print", "filesystem", "kafka"];

/// Error sink for one document entity.
struct Fields<'a> {
    label: String,
    errors: &'a mut Vec<String>,
}

impl<'a> Fields<'a> {
    fn new(kind: &str, index: usize, name: Option<&str>, errors: &'a mut Vec<String>) -> Self {
        let label = match name {
            Some(n) if !n.trim().is_empty() => format!("{kind}[{index}] '{n}'"),
            _ => format!("{kind}[{index}]"),
        };
        Self { label, errors }
    }

    fn push(&mut self, message: impl AsRef<str>) {
        self.errors.push(format!("{}: {}", self.label, message.as_ref()));
    }

    fn require(&mut self, value: Option<&str>, field: &str) -> Option<String> {
        match value.map(str::trim) {
            Some(v) if !v.is_empty() => Some(v.to_string()),
            _ => {
                self.push(format!("missing required field '{field}'"));
                None
            }
        }
    }

    fn require_scalar(&mut self, value: Option<&Scalar>, field: &str) -> Option<String> {
        let text = value.map(Scalar::as_text);
        self.require(text.as_deref(), field)
    }

    fn positive(&mut self, value: Option<&Scalar>, field: &str, default: u64) -> Option<u64> {
        let Some(scalar) = value else {
            return Some(default);
        };
        match scalar.as_u64() {
            Some(n) if n >= 1 => Some(n),
            _ => {
                self.push(format!(
                    "'{field}' must be a positive integer, got '{}'",
                    scalar.as_text()
                ));
                None
            }
        }
    }

    fn port(&mut self, value: Option<&Scalar>, field: &str, default: u16) -> Option<u16> {
        let Some(scalar) = value else {
            return Some(default);
        };
        match scalar.as_u64().and_then(|n| u16::try_from(n).ok()) {
            Some(p) if p > 0 => Some(p),
            _ => {
                self.push(format!("invalid port '{}' for '{field}'", scalar.as_text()));
                None
            }
        }
    }

    /// A field that must be present but may be empty. The value is kept verbatim.
    fn present(&mut self, value: Option<&Scalar>, field: &str) -> Option<String> {
        if value.is_none() {
            self.push(format!("missing required field '{field}'"));
        }
        value.map(Scalar::as_text)
    }

    fn reject(&mut self, present: bool, field: &str, tag: &str) {
        if present {
            self.push(format!("field '{field}' is not allowed for type '{tag}'"));
        }
    }

    fn credentials(&mut self, config: Option<&RawConnection>) -> Option<Credentials> {
        let username = self.require_scalar(config.and_then(|c| c.username.as_ref()), "config.username");
        let password = self.present(config.and_then(|c| c.password.as_ref()), "config.password");
        Some(Credentials {
            username: username?,
            password: password?,
        })
    }
}

/// Validate a raw pipeline document and build the typed `PipelineSpec`.
///
/// # Errors
///
/// Returns `UnsupportedSourceType`/`UnsupportedSinkType` for unknown type
/// tags, otherwise a config error listing every validation failure.
pub fn validate_pipeline(raw: RawPipelineSpec) -> Result<PipelineSpec, PipelineError> {
    reject_unknown_tags(&raw)?;

    let mut errors = Vec::new();

    let name = require_top(raw.name.as_deref(), "name", &mut errors);
    let spec_version = require_top(
        raw.spec_version.as_ref().map(Scalar::as_text).as_deref(),
        "specVersion",
        &mut errors,
    );
    let parallelism = match raw.parallelism.as_ref() {
        None => {
            errors.push("pipeline: missing required field 'parallelism'".to_string());
            None
        }
        Some(p) => match p.as_u64().and_then(|n| u32::try_from(n).ok()) {
            Some(n) if n >= 1 => Some(n),
            _ => {
                errors.push(format!(
                    "pipeline: 'parallelism' must be at least 1, got '{}'",
                    p.as_text()
                ));
                None
            }
        },
    };

    let sources: Vec<Option<SourceDef>> = raw
        .sources
        .iter()
        .enumerate()
        .map(|(i, s)| validate_source(i, s, &mut errors))
        .collect();
    let transforms: Vec<Option<TransformDef>> = raw
        .transforms
        .iter()
        .enumerate()
        .map(|(i, t)| validate_transform(i, t, &mut errors))
        .collect();
    let sinks: Vec<Option<SinkDef>> = raw
        .sinks
        .iter()
        .enumerate()
        .map(|(i, s)| validate_sink(i, s, &mut errors))
        .collect();

    check_names(&raw, &mut errors);

    if !errors.is_empty() {
        return Err(PipelineError::config(format!(
            "pipeline validation failed:\n  - {}",
            errors.join("\n  - ")
        )));
    }

    let (Some(name), Some(spec_version), Some(parallelism)) = (name, spec_version, parallelism)
    else {
        return Err(PipelineError::config("pipeline validation failed"));
    };

    Ok(PipelineSpec {
        name,
        spec_version,
        parallelism,
        checkpoint_dir: raw
            .state_checkpoints_dir
            .unwrap_or_else(|| DEFAULT_CHECKPOINT_DIR.to_string()),
        savepoint_dir: raw
            .state_savepoints_dir
            .unwrap_or_else(|| DEFAULT_SAVEPOINT_DIR.to_string()),
        sources: sources.into_iter().flatten().collect(),
        transforms: transforms.into_iter().flatten().collect(),
        sinks: sinks.into_iter().flatten().collect(),
    })
}

fn require_top(value: Option<&str>, field: &str, errors: &mut Vec<String>) -> Option<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Some(v.to_string()),
        _ => {
            errors.push(format!("pipeline: missing required field '{field}'"));
            None
        }
    }
}

fn reject_unknown_tags(raw: &RawPipelineSpec) -> Result<(), PipelineError> {
    for (i, source) in raw.sources.iter().enumerate() {
        if let Some(tag) = source.type_tag.as_deref() {
            if !SOURCE_TAGS.contains(&tag.trim()) {
                return Err(PipelineError::UnsupportedSourceType {
                    source_name: display_name(source.name.as_deref(), "sources", i),
                    type_tag: tag.to_string(),
                });
            }
        }
    }
    for (i, sink) in raw.sinks.iter().enumerate() {
        if let Some(tag) = sink.type_tag.as_deref() {
            if !SINK_TAGS.contains(&tag.trim()) {
                return Err(PipelineError::UnsupportedSinkType {
                    sink: display_name(sink.name.as_deref(), "sinks", i),
                    type_tag: tag.to_string(),
                });
            }
        }
    }
    Ok(())
}

fn display_name(name: Option<&str>, kind: &str, index: usize) -> String {
    name.map_or_else(|| format!("{kind}[{index}]"), str::to_string)
}

fn validate_source(index: usize, raw: &RawSource, errors: &mut Vec<String>) -> Option<SourceDef> {
    let mut f = Fields::new("sources", index, raw.name.as_deref(), errors);
    let name = f.require(raw.name.as_deref(), "name");
    let tag = f.require(raw.type_tag.as_deref(), "type");
    let dataset = f.require(raw.dataset.as_deref(), "dataset");
    let parallelism = f
        .positive(raw.parallelism.as_ref(), "parallelism", 1)
        .and_then(|n| u32::try_from(n).ok());

    let tag = tag?;
    reject_foreign_fields(&mut f, raw, &tag);

    let offset = raw.offset.as_ref().map(Scalar::as_text);
    let kind = match tag.as_str() {
        "dataset" => Some(SourceKind::Dataset),
        "tumble_window_dataset" => {
            let timecol = f.require(raw.timecol.as_deref(), "timecol");
            let size = f.require_scalar(raw.size.as_ref(), "size");
            Some(SourceKind::Tumble {
                timecol: timecol?,
                size: size?,
                offset,
            })
        }
        "hop_window_dataset" => {
            let timecol = f.require(raw.timecol.as_deref(), "timecol");
            let slide = f.require_scalar(raw.slide.as_ref(), "slide");
            let size = f.require_scalar(raw.size.as_ref(), "size");
            Some(SourceKind::Hop {
                timecol: timecol?,
                slide: slide?,
                size: size?,
                offset,
            })
        }
        "cumulative_window_dataset" => {
            let timecol = f.require(raw.timecol.as_deref(), "timecol");
            let step = f.require_scalar(raw.step.as_ref(), "step");
            let size = f.require_scalar(raw.size.as_ref(), "size");
            Some(SourceKind::Cumulate {
                timecol: timecol?,
                step: step?,
                size: size?,
                offset,
            })
        }
        "lookup_dataset" => {
            let mut cache = LookupCache::default();
            if let Some(lookup) = raw.lookup.as_ref() {
                if let Some(rows) = f.positive(lookup.cache_rows.as_ref(), "lookup.cache-rows", cache.cache_rows) {
                    cache.cache_rows = rows;
                }
                if let Some(ttl) = lookup.cache_ttl.as_ref() {
                    cache.cache_ttl = ttl.as_text();
                }
            }
            Some(SourceKind::Lookup(cache))
        }
        other => {
            f.push(format!("unsupported source type '{other}'"));
            None
        }
    };

    Some(SourceDef {
        name: name?,
        dataset: dataset?,
        filter: raw
            .filter
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        parallelism: parallelism?,
        kind: kind?,
    })
}

/// Temporal fields a source type accepts. Anything else set on the entity
/// is reported.
fn reject_foreign_fields(f: &mut Fields<'_>, raw: &RawSource, tag: &str) {
    let allowed: &[&str] = match tag {
        "tumble_window_dataset" => &["timecol", "size", "offset"],
        "hop_window_dataset" => &["timecol", "slide", "size", "offset"],
        "cumulative_window_dataset" => &["timecol", "step", "size", "offset"],
        "lookup_dataset" => &["lookup"],
        _ => &[],
    };
    let set = [
        ("timecol", raw.timecol.is_some()),
        ("size", raw.size.is_some()),
        ("slide", raw.slide.is_some()),
        ("step", raw.step.is_some()),
        ("offset", raw.offset.is_some()),
        ("lookup", raw.lookup.is_some()),
    ];
    for (field, present) in set {
        f.reject(present && !allowed.contains(&field), field, tag);
    }
}

fn validate_transform(
    index: usize,
    raw: &RawTransform,
    errors: &mut Vec<String>,
) -> Option<TransformDef> {
    let mut f = Fields::new("transforms", index, raw.name.as_deref(), errors);
    let name = f.require(raw.name.as_deref(), "name");
    let sql = f.require(raw.sql.as_deref(), "sql");
    Some(TransformDef {
        name: name?,
        sql: sql?,
        params: raw.params.clone(),
    })
}

fn validate_sink(index: usize, raw: &RawSink, errors: &mut Vec<String>) -> Option<SinkDef> {
    let mut f = Fields::new("sinks", index, raw.name.as_deref(), errors);
    let name = f.require(raw.name.as_deref(), "name");
    let tag = f.require(raw.type_tag.as_deref(), "type");
    let from = f.require(raw.from.as_deref(), "from");
    let config = raw.config.as_ref();

    let kind = match tag.as_deref()? {
        "postgres" => {
            let database = f.require(raw.database.as_deref(), "database");
            let schema = f.require(raw.schema.as_deref(), "schema");
            let table = f.require(raw.table.as_deref(), "table");
            let primary_key = match raw.primary_key.clone().map(|k| k.into_vec()) {
                Some(cols) if !cols.is_empty() => Some(cols),
                _ => {
                    f.push("missing required field 'primary_key'");
                    None
                }
            };
            let host = f.require(config.and_then(|c| c.host.as_deref()), "config.host");
            let port = f.port(config.and_then(|c| c.port.as_ref()), "config.port", DEFAULT_POSTGRES_PORT);
            let credentials = f.credentials(config);
            Some(SinkKind::Postgres(PostgresSink {
                host: host?,
                port: port?,
                credentials: credentials?,
                database: database?,
                schema: schema?,
                table: table?,
                primary_key: primary_key?,
            }))
        }
        "starrocks" => {
            let database = f.require(raw.database.as_deref(), "database");
            let table = f.require(raw.table.as_deref(), "table");
            let query_port = f.port(raw.query_port.as_ref(), "query_port", DEFAULT_STARROCKS_QUERY_PORT);
            let http_port = f.port(raw.http_port.as_ref(), "http_port", DEFAULT_STARROCKS_HTTP_PORT);
            let credentials = f.credentials(config);
            let host = config
                .and_then(|c| c.host.clone())
                .unwrap_or_else(|| DEFAULT_STARROCKS_HOST.to_string());
            Some(SinkKind::Starrocks(StarRocksSink {
                host,
                query_port: query_port?,
                http_port: http_port?,
                credentials: credentials?,
                database: database?,
                table: table?,
            }))
        }
        "print" => Some(SinkKind::Print),
        "filesystem" => {
            let file_name = f.require(raw.file_name.as_deref(), "file_name");
            Some(SinkKind::Filesystem {
                file_name: file_name?,
            })
        }
        "kafka" => {
            let topic = f.require(raw.topic.as_deref(), "topic");
            let servers = f.require(raw.kafka_servers.as_deref(), "kafka_servers");
            let credentials = f.credentials(config);
            Some(SinkKind::Kafka(KafkaSink {
                topic: topic?,
                bootstrap_servers: servers?,
                truststore_location: raw.truststore_location.clone(),
                truststore_password: raw.truststore_password.as_ref().map(Scalar::as_text),
                credentials: credentials?,
                format: raw
                    .format
                    .clone()
                    .unwrap_or_else(|| DEFAULT_KAFKA_FORMAT.to_string()),
            }))
        }
        other => {
            f.push(format!("unsupported sink type '{other}'"));
            None
        }
    };

    Some(SinkDef {
        name: name?,
        from: from?,
        kind: kind?,
    })
}

/// Names share one namespace across sources, transforms and sinks, and
/// must not shadow a transform's intermediate `<name>_tmp` view.
fn check_names(raw: &RawPipelineSpec, errors: &mut Vec<String>) {
    let names = raw
        .sources
        .iter()
        .map(|s| s.name.as_deref())
        .chain(raw.transforms.iter().map(|t| t.name.as_deref()))
        .chain(raw.sinks.iter().map(|s| s.name.as_deref()))
        .flatten()
        .map(str::trim)
        .filter(|n| !n.is_empty());

    let mut seen = HashSet::new();
    for name in names.clone() {
        if !seen.insert(name) {
            errors.push(format!("duplicate name '{name}'"));
        }
    }

    for transform in raw.transforms.iter().filter_map(|t| t.name.as_deref()) {
        let intermediate = format!("{}_tmp", transform.trim());
        if names.clone().any(|n| n == intermediate) {
            errors.push(format!(
                "name '{intermediate}' collides with the intermediate view of transform '{}'",
                transform.trim()
            ));
        }
    }
}
