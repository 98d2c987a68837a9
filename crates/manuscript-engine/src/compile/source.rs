//! Source views over catalog datasets.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use manuscript_types::spec::LookupCache;
use manuscript_types::{SourceDef, SourceKind};
use regex::Regex;

use crate::context::{CompileContext, StatementKind};
use crate::error::{PipelineError, Stage};
use crate::sql::{quote_ident, quote_path, render_options};

/// How far back a windowed source without an offset starts reading.
const LOOK_BACK_MS: i64 = 60_000;
const DISCOVERY_INTERVAL: &str = "500ms";

static INTERVAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(\d+)\s*(s|sec|secs|second|seconds|m|min|mins|minute|minutes|h|hr|hour|hours|d|day|days)\s*$")
        .expect("valid interval regex")
});

/// Starting position of a streaming scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    Latest,
    /// Epoch milliseconds to start reading from.
    FromTimestamp(i64),
}

/// Windowed sources with an offset read from the latest snapshot; without
/// one they look back a fixed interval from `now`.
#[must_use]
pub fn resolve_scan_mode(kind: &SourceKind, now: DateTime<Utc>) -> ScanMode {
    let offset = match kind {
        SourceKind::Tumble { offset, .. }
        | SourceKind::Hop { offset, .. }
        | SourceKind::Cumulate { offset, .. } => offset,
        SourceKind::Dataset | SourceKind::Lookup(_) => return ScanMode::Latest,
    };
    match offset {
        Some(_) => ScanMode::Latest,
        None => ScanMode::FromTimestamp(now.timestamp_millis() - LOOK_BACK_MS),
    }
}

/// Turn shorthand such as `10min` or `30s` into an `INTERVAL` literal.
/// Anything else is passed through verbatim.
#[must_use]
pub fn interval_expr(value: &str) -> String {
    let Some(caps) = INTERVAL_RE.captures(value) else {
        return value.trim().to_string();
    };
    let unit = match caps[2].to_ascii_lowercase().as_str() {
        "s" | "sec" | "secs" | "second" | "seconds" => "SECOND",
        "m" | "min" | "mins" | "minute" | "minutes" => "MINUTE",
        "h" | "hr" | "hour" | "hours" => "HOUR",
        _ => "DAY",
    };
    format!("INTERVAL '{}' {unit}", &caps[1])
}

fn scan_options(source: &SourceDef, mode: ScanMode) -> Vec<(&'static str, String)> {
    let mut options = match mode {
        ScanMode::Latest => vec![("scan.mode", "latest".to_string())],
        ScanMode::FromTimestamp(ms) => vec![
            ("scan.mode", "from-timestamp".to_string()),
            ("scan.timestamp-millis", ms.to_string()),
        ],
    };
    options.push(("continuous.discovery-interval", DISCOVERY_INTERVAL.to_string()));
    options.push(("scan.infer-parallelism", "false".to_string()));
    options.push(("scan.parallelism", source.parallelism.to_string()));
    options
}

fn lookup_options(source: &SourceDef, cache: &LookupCache) -> Vec<(&'static str, String)> {
    vec![
        ("scan.infer-parallelism", "false".to_string()),
        ("scan.parallelism", source.parallelism.to_string()),
        ("lookup.cache-rows", cache.cache_rows.to_string()),
        ("lookup.cache-ttl", cache.cache_ttl.clone()),
    ]
}

fn scan(catalog: &str, source: &SourceDef, options: &[(&str, String)]) -> String {
    let mut sql = format!(
        "SELECT * FROM {}.{} /*+ OPTIONS({}) */",
        quote_ident(catalog),
        quote_path(&source.dataset),
        render_options(options)
    );
    if let Some(filter) = &source.filter {
        sql.push_str(" WHERE ");
        sql.push_str(filter);
    }
    sql
}

fn window(function: &str, base: &str, timecol: &str, args: &[&str], offset: Option<&str>) -> String {
    let mut parts: Vec<String> = args.iter().map(|a| interval_expr(a)).collect();
    if let Some(offset) = offset {
        parts.push(interval_expr(offset));
    }
    format!(
        "SELECT * FROM TABLE({function}(({base}), DESCRIPTOR({}), {}))",
        quote_ident(timecol),
        parts.join(", ")
    )
}

/// The `CREATE TEMPORARY VIEW` statement for one source.
#[must_use]
pub fn source_statement(catalog: &str, source: &SourceDef, now: DateTime<Utc>) -> String {
    let mode = resolve_scan_mode(&source.kind, now);
    let body = match &source.kind {
        SourceKind::Dataset => scan(catalog, source, &scan_options(source, mode)),
        SourceKind::Tumble {
            timecol,
            size,
            offset,
        } => window(
            "TUMBLE",
            &scan(catalog, source, &scan_options(source, mode)),
            timecol,
            &[size.as_str()],
            offset.as_deref(),
        ),
        SourceKind::Hop {
            timecol,
            slide,
            size,
            offset,
        } => window(
            "HOP",
            &scan(catalog, source, &scan_options(source, mode)),
            timecol,
            &[slide.as_str(), size.as_str()],
            offset.as_deref(),
        ),
        SourceKind::Cumulate {
            timecol,
            step,
            size,
            offset,
        } => window(
            "CUMULATE",
            &scan(catalog, source, &scan_options(source, mode)),
            timecol,
            &[step.as_str(), size.as_str()],
            offset.as_deref(),
        ),
        SourceKind::Lookup(cache) => scan(catalog, source, &lookup_options(source, cache)),
    };
    format!("CREATE TEMPORARY VIEW {} AS {body}", quote_ident(&source.name))
}

/// Create the source view on the runtime and register its schema.
///
/// # Errors
///
/// Returns a compile error if the runtime rejects the view.
pub async fn compile_source(ctx: &mut CompileContext, source: &SourceDef) -> Result<(), PipelineError> {
    let sql = source_statement(&ctx.settings().catalog, source, ctx.now());
    tracing::info!(
        source = %source.name,
        kind = source.kind.tag(),
        dataset = %source.dataset,
        "Compiling source"
    );
    ctx.issue(Stage::Source, StatementKind::SourceView, &source.name, sql)
        .await?;
    let columns = ctx.describe(Stage::Source, &source.name, &source.name).await?;
    ctx.register(&source.name, columns)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_060_000).unwrap()
    }

    fn source(kind: SourceKind) -> SourceDef {
        SourceDef {
            name: "events".into(),
            dataset: "zkevm.blocks".into(),
            filter: None,
            parallelism: 2,
            kind,
        }
    }

    fn tumble(offset: Option<&str>) -> SourceKind {
        SourceKind::Tumble {
            timecol: "ts".into(),
            size: "10min".into(),
            offset: offset.map(String::from),
        }
    }

    #[test]
    fn plain_dataset_reads_latest() {
        let mut src = source(SourceKind::Dataset);
        src.filter = Some("amount > 0".into());
        let sql = source_statement("paimon", &src, now());
        assert_eq!(
            sql,
            "CREATE TEMPORARY VIEW `events` AS SELECT * FROM `paimon`.`zkevm`.`blocks` \
             /*+ OPTIONS('scan.mode' = 'latest', 'continuous.discovery-interval' = '500ms', \
             'scan.infer-parallelism' = 'false', 'scan.parallelism' = '2') */ WHERE amount > 0"
        );
    }

    #[test]
    fn tumble_without_offset_looks_back_one_minute() {
        assert_eq!(
            resolve_scan_mode(&tumble(None), now()),
            ScanMode::FromTimestamp(1_700_000_000_000)
        );
        let sql = source_statement("paimon", &source(tumble(None)), now());
        assert!(sql.contains("'scan.mode' = 'from-timestamp'"));
        assert!(sql.contains("'scan.timestamp-millis' = '1700000000000'"));
        assert!(sql.contains("TABLE(TUMBLE((SELECT * FROM"));
        assert!(sql.ends_with("DESCRIPTOR(`ts`), INTERVAL '10' MINUTE))"));
    }

    #[test]
    fn tumble_with_offset_reads_latest() {
        assert_eq!(resolve_scan_mode(&tumble(Some("5s")), now()), ScanMode::Latest);
        let sql = source_statement("paimon", &source(tumble(Some("5s"))), now());
        assert!(sql.contains("'scan.mode' = 'latest'"));
        assert!(sql.ends_with("INTERVAL '10' MINUTE, INTERVAL '5' SECOND))"));
    }

    #[test]
    fn hop_and_cumulate_argument_order() {
        let hop = SourceKind::Hop {
            timecol: "ts".into(),
            slide: "1min".into(),
            size: "5min".into(),
            offset: None,
        };
        let sql = source_statement("paimon", &source(hop), now());
        assert!(sql.contains("HOP(("));
        assert!(sql.ends_with("INTERVAL '1' MINUTE, INTERVAL '5' MINUTE))"));

        let cumulate = SourceKind::Cumulate {
            timecol: "ts".into(),
            step: "1h".into(),
            size: "1d".into(),
            offset: None,
        };
        let sql = source_statement("paimon", &source(cumulate), now());
        assert!(sql.contains("CUMULATE(("));
        assert!(sql.ends_with("INTERVAL '1' HOUR, INTERVAL '1' DAY))"));
    }

    #[test]
    fn lookup_carries_cache_hints() {
        let sql = source_statement("paimon", &source(SourceKind::Lookup(LookupCache::default())), now());
        assert!(sql.contains("'lookup.cache-rows' = '5000'"));
        assert!(sql.contains("'lookup.cache-ttl' = '240s'"));
        assert!(!sql.contains("scan.mode"));
    }

    #[test]
    fn interval_shorthand() {
        assert_eq!(interval_expr("30s"), "INTERVAL '30' SECOND");
        assert_eq!(interval_expr("2 days"), "INTERVAL '2' DAY");
        assert_eq!(interval_expr("INTERVAL '1' HOUR"), "INTERVAL '1' HOUR");
    }
}
