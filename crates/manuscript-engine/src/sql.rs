//! Quoting helpers for runtime SQL text.

use std::sync::LazyLock;

use regex::Regex;

static SECRET_OPTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"('(?:[\w.-]*password|properties\.sasl\.jaas\.config)'\s*=\s*)'(?:[^']|'')*'")
        .expect("valid secret option regex")
});

/// Backtick-quote a runtime identifier, doubling embedded backticks.
#[must_use]
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Quote a possibly dotted reference (`db.table`) part by part.
#[must_use]
pub fn quote_path(path: &str) -> String {
    path.split('.').map(quote_ident).collect::<Vec<_>>().join(".")
}

/// PostgreSQL identifier as the runtime's JDBC writer will reach it.
///
/// The writer sends table and column names unquoted, so the server folds
/// them to lowercase. The destination DDL folds the same way and quotes
/// only where PostgreSQL requires it.
#[must_use]
pub fn pg_identifier(name: &str) -> String {
    pg_escape::quote_identifier(&name.to_lowercase()).into_owned()
}

/// Single-quoted SQL string literal with embedded quotes doubled.
#[must_use]
pub fn string_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Render `'k' = 'v'` pairs for `WITH (...)` clauses and `OPTIONS` hints.
#[must_use]
pub fn render_options<K: AsRef<str>, V: AsRef<str>>(options: &[(K, V)]) -> String {
    options
        .iter()
        .map(|(k, v)| format!("{} = {}", string_literal(k.as_ref()), string_literal(v.as_ref())))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Statement text safe to log: secret option values are masked.
#[must_use]
pub fn redact(sql: &str) -> String {
    SECRET_OPTION_RE.replace_all(sql, "${1}'***'").into_owned()
}
