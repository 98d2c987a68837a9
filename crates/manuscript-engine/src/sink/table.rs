//! Runtime sink tables.

use manuscript_types::spec::{KafkaSink, PostgresSink, StarRocksSink};
use manuscript_types::SinkKind;

use crate::settings::EngineSettings;
use crate::sql::{pg_identifier, quote_ident, render_options};

const KAFKA_LOGIN_MODULE: &str = "org.apache.kafka.common.security.plain.PlainLoginModule";
const FILESYSTEM_FORMAT: &str = "debezium-json";

fn postgres_options(pg: &PostgresSink) -> Vec<(&'static str, String)> {
    vec![
        ("connector", "jdbc".to_string()),
        (
            "url",
            format!("jdbc:postgresql://{}:{}/{}", pg.host, pg.port, pg.database),
        ),
        (
            "table-name",
            format!("{}.{}", pg_identifier(&pg.schema), pg_identifier(&pg.table)),
        ),
        ("username", pg.credentials.username.clone()),
        ("password", pg.credentials.password.clone()),
    ]
}

fn starrocks_options(sr: &StarRocksSink) -> Vec<(&'static str, String)> {
    vec![
        ("connector", "starrocks".to_string()),
        (
            "jdbc-url",
            format!("jdbc:mysql://{}:{}/{}", sr.host, sr.query_port, sr.database),
        ),
        ("load-url", format!("{}:{}", sr.host, sr.http_port)),
        ("database-name", sr.database.clone()),
        ("table-name", sr.table.clone()),
        ("username", sr.credentials.username.clone()),
        ("password", sr.credentials.password.clone()),
    ]
}

fn jaas_config(kafka: &KafkaSink) -> String {
    let escape = |s: &str| s.replace('\\', "\\\\").replace('"', "\\\"");
    format!(
        "{KAFKA_LOGIN_MODULE} required username=\"{}\" password=\"{}\";",
        escape(&kafka.credentials.username),
        escape(&kafka.credentials.password)
    )
}

fn kafka_options(kafka: &KafkaSink) -> Vec<(&'static str, String)> {
    let mut options = vec![
        ("connector", "kafka".to_string()),
        ("topic", kafka.topic.clone()),
        ("properties.bootstrap.servers", kafka.bootstrap_servers.clone()),
        ("properties.security.protocol", "SASL_SSL".to_string()),
    ];
    if let Some(location) = &kafka.truststore_location {
        options.push(("properties.ssl.truststore.location", location.clone()));
    }
    if let Some(password) = &kafka.truststore_password {
        options.push(("properties.ssl.truststore.password", password.clone()));
    }
    options.push(("properties.sasl.mechanism", "PLAIN".to_string()));
    options.push(("properties.ssl.endpoint.identification.algorithm", String::new()));
    options.push(("properties.sasl.jaas.config", jaas_config(kafka)));
    options.push(("format", kafka.format.clone()));
    options
}

/// Connector options for a sink kind.
#[must_use]
pub fn connector_options(kind: &SinkKind, settings: &EngineSettings) -> Vec<(&'static str, String)> {
    match kind {
        SinkKind::Postgres(pg) => postgres_options(pg),
        SinkKind::Starrocks(sr) => starrocks_options(sr),
        SinkKind::Print => vec![
            ("connector", "print".to_string()),
            ("standard-error", "true".to_string()),
        ],
        SinkKind::Filesystem { file_name } => vec![
            ("connector", "filesystem".to_string()),
            (
                "path",
                format!("{}/{file_name}", settings.sink_root.trim_end_matches('/')),
            ),
            ("format", FILESYSTEM_FORMAT.to_string()),
        ],
        SinkKind::Kafka(kafka) => kafka_options(kafka),
    }
}

/// `CREATE TABLE` registering a sink on the runtime.
///
/// Postgres sinks declare their primary key as `NOT ENFORCED`; the
/// relational table enforces it.
#[must_use]
pub fn sink_table_statement(
    sink: &str,
    kind: &SinkKind,
    column_defs: &[String],
    settings: &EngineSettings,
) -> String {
    let mut parts = column_defs.to_vec();
    if let SinkKind::Postgres(pg) = kind {
        let key = pg
            .primary_key
            .iter()
            .map(|k| quote_ident(k))
            .collect::<Vec<_>>()
            .join(", ");
        parts.push(format!("PRIMARY KEY ({key}) NOT ENFORCED"));
    }
    format!(
        "CREATE TABLE {} ({}) WITH ({})",
        quote_ident(sink),
        parts.join(", "),
        render_options(&connector_options(kind, settings))
    )
}
