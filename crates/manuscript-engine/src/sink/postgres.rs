//! Relational destination provisioning.
//!
//! The database, schema and table are created idempotently, each step on
//! its own short-lived connection.

use async_trait::async_trait;
use manuscript_types::spec::PostgresSink;
use pg_escape::quote_identifier;
use tokio_postgres::{Client, Config as PgConfig, NoTls};

use crate::error::PipelineError;
use crate::sql::pg_identifier;

const MAINTENANCE_DATABASE: &str = "postgres";
pub const DATABASE_EXISTS_QUERY: &str = "SELECT 1 FROM pg_database WHERE datname = $1";

/// Administrative access to a PostgreSQL server.
#[async_trait]
pub trait PostgresAdmin: Send + Sync {
    async fn database_exists(&self, conn: &PostgresSink, database: &str) -> Result<bool, String>;

    async fn create_database(&self, conn: &PostgresSink, database: &str) -> Result<(), String>;

    /// Run one statement inside `database`.
    async fn execute_in(&self, conn: &PostgresSink, database: &str, sql: &str)
        -> Result<(), String>;
}

/// [`PostgresAdmin`] over `tokio-postgres`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PgAdmin;

fn format_pg_error(prefix: &str, error: &tokio_postgres::Error) -> String {
    if let Some(db_error) = error.as_db_error() {
        let detail = db_error.detail().unwrap_or("n/a");
        let hint = db_error.hint().unwrap_or("n/a");
        format!(
            "{prefix}: {} (sqlstate={} severity={} detail={} hint={})",
            db_error.message(),
            db_error.code().code(),
            db_error.severity(),
            detail,
            hint
        )
    } else {
        format!("{prefix}: {error}")
    }
}

/// Another writer created the same object between our check and create.
fn is_concurrent_create_race(error: &tokio_postgres::Error) -> bool {
    let Some(db_error) = error.as_db_error() else {
        return false;
    };
    match db_error.code().code() {
        // duplicate_database, duplicate_schema, duplicate_table
        "42P04" | "42P06" | "42P07" => true,
        "23505" => {
            db_error.message().contains("pg_type_typname_nsp_index")
                || db_error
                    .detail()
                    .unwrap_or_default()
                    .contains("pg_type_typname_nsp_index")
                || db_error.message().contains("pg_namespace_nspname_index")
        }
        _ => false,
    }
}

async fn connect(conn: &PostgresSink, database: &str) -> Result<Client, String> {
    let mut pg = PgConfig::new();
    pg.host(&conn.host);
    pg.port(conn.port);
    pg.user(&conn.credentials.username);
    if !conn.credentials.password.is_empty() {
        pg.password(&conn.credentials.password);
    }
    pg.dbname(database);

    let (client, connection) = pg
        .connect(NoTls)
        .await
        .map_err(|e| format_pg_error(&format!("Connection to {}:{}/{database} failed", conn.host, conn.port), &e))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::warn!(error = %e, "PostgreSQL connection error");
        }
    });

    Ok(client)
}

#[async_trait]
impl PostgresAdmin for PgAdmin {
    async fn database_exists(&self, conn: &PostgresSink, database: &str) -> Result<bool, String> {
        let client = connect(conn, MAINTENANCE_DATABASE).await?;
        let rows = client
            .query(DATABASE_EXISTS_QUERY, &[&database])
            .await
            .map_err(|e| format_pg_error("Database lookup failed", &e))?;
        Ok(!rows.is_empty())
    }

    async fn create_database(&self, conn: &PostgresSink, database: &str) -> Result<(), String> {
        let client = connect(conn, MAINTENANCE_DATABASE).await?;
        match client.batch_execute(&create_database_statement(database)).await {
            Ok(()) => Ok(()),
            Err(e) if is_concurrent_create_race(&e) => Ok(()),
            Err(e) => Err(format_pg_error(
                &format!("Failed to create database '{database}'"),
                &e,
            )),
        }
    }

    async fn execute_in(
        &self,
        conn: &PostgresSink,
        database: &str,
        sql: &str,
    ) -> Result<(), String> {
        let client = connect(conn, database).await?;
        match client.batch_execute(sql).await {
            Ok(()) => Ok(()),
            Err(e) if is_concurrent_create_race(&e) => Ok(()),
            Err(e) => Err(format_pg_error("Statement failed", &e)),
        }
    }
}

#[must_use]
pub fn create_database_statement(database: &str) -> String {
    format!("CREATE DATABASE {}", quote_identifier(database))
}

#[must_use]
pub fn create_schema_statement(schema: &str) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS {}", pg_identifier(schema))
}

/// `CREATE TABLE IF NOT EXISTS` with the mapped column definitions and
/// the sink's primary key.
#[must_use]
pub fn create_table_statement(pg: &PostgresSink, column_defs: &[String]) -> String {
    let key = pg
        .primary_key
        .iter()
        .map(|k| pg_identifier(k))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE TABLE IF NOT EXISTS {}.{} ({}, PRIMARY KEY ({key}))",
        pg_identifier(&pg.schema),
        pg_identifier(&pg.table),
        column_defs.join(", ")
    )
}

/// Ensure the destination database, schema and table exist.
///
/// With `dry_run` the statements are only logged.
///
/// # Errors
///
/// Returns a provisioning error carrying the failed statement.
pub async fn provision(
    admin: &dyn PostgresAdmin,
    sink: &str,
    pg: &PostgresSink,
    column_defs: &[String],
    dry_run: bool,
) -> Result<(), PipelineError> {
    let schema_sql = create_schema_statement(&pg.schema);
    let table_sql = create_table_statement(pg, column_defs);

    if dry_run {
        tracing::info!(
            sink,
            host = %pg.host,
            database = %pg.database,
            schema_ddl = %schema_sql,
            table_ddl = %table_sql,
            "Dry run: skipping relational provisioning"
        );
        return Ok(());
    }

    let failed = |statement: String, message: String| PipelineError::Provisioning {
        sink: sink.to_string(),
        statement: Some(statement),
        message,
    };

    let exists = admin
        .database_exists(pg, &pg.database)
        .await
        .map_err(|m| failed(DATABASE_EXISTS_QUERY.to_string(), m))?;
    if exists {
        tracing::info!(sink, database = %pg.database, "Database already exists");
    } else {
        admin
            .create_database(pg, &pg.database)
            .await
            .map_err(|m| failed(create_database_statement(&pg.database), m))?;
        tracing::info!(sink, database = %pg.database, "Created database");
    }

    admin
        .execute_in(pg, &pg.database, &schema_sql)
        .await
        .map_err(|m| failed(schema_sql.clone(), m))?;
    admin
        .execute_in(pg, &pg.database, &table_sql)
        .await
        .map_err(|m| failed(table_sql.clone(), m))?;
    tracing::info!(
        sink,
        schema = %pg.schema,
        table = %pg.table,
        "Destination table ready"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use manuscript_types::spec::Credentials;

    use super::*;

    fn sink() -> PostgresSink {
        PostgresSink {
            host: "pg.local".into(),
            port: 5432,
            credentials: Credentials {
                username: "writer".into(),
                password: "secret".into(),
            },
            database: "analytics".into(),
            schema: "Reporting".into(),
            table: "big_events".into(),
            primary_key: vec!["id".into()],
        }
    }

    #[test]
    fn schema_statement_folds_mixed_case() {
        assert_eq!(
            create_schema_statement("Reporting"),
            "CREATE SCHEMA IF NOT EXISTS reporting"
        );
        assert_eq!(
            create_schema_statement("raw-data"),
            "CREATE SCHEMA IF NOT EXISTS \"raw-data\""
        );
    }

    #[test]
    fn table_statement_has_primary_key() {
        let sql = create_table_statement(&sink(), &["id BIGINT NOT NULL".into(), "amount NUMERIC(10,2)".into()]);
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS reporting.big_events \
             (id BIGINT NOT NULL, amount NUMERIC(10,2), PRIMARY KEY (id))"
        );
    }

    #[test]
    fn database_statement_quotes_identifier() {
        assert_eq!(create_database_statement("analytics"), "CREATE DATABASE analytics");
    }
}
