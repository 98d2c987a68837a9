//! Sink provisioning.
//!
//! Every sink's columns are mapped before any sink emits DDL, so an
//! unsupported column type anywhere fails the run without side effects.

pub mod postgres;
pub mod table;

use manuscript_types::{Column, SinkDef, SinkKind};

use crate::context::{CompileContext, StatementKind};
use crate::error::{PipelineError, Stage};
use crate::type_map::{postgres_column_defs, runtime_column_defs};

pub use postgres::{PgAdmin, PostgresAdmin};
pub use table::sink_table_statement;

/// Columns written to a sink: everything except processing-time columns.
#[must_use]
pub fn sink_columns(columns: &[Column]) -> Vec<Column> {
    columns
        .iter()
        .filter(|c| !c.is_processing_time())
        .cloned()
        .collect()
}

/// Column definitions of one sink, mapped for every system it touches.
#[derive(Debug, Clone)]
pub struct SinkLayout {
    pub columns: Vec<Column>,
    pub runtime_defs: Vec<String>,
    /// Present for PostgreSQL sinks only.
    pub postgres_defs: Option<Vec<String>>,
}

/// Map the columns of a sink's source view without emitting any DDL.
///
/// # Errors
///
/// Returns `UnsupportedType` naming the first column that cannot be mapped.
pub fn sink_layout(ctx: &CompileContext, sink: &SinkDef) -> Result<SinkLayout, PipelineError> {
    let columns = sink_columns(ctx.schema(&sink.from)?);
    let runtime_defs = runtime_column_defs(&sink.from, &columns)?;
    let postgres_defs = match &sink.kind {
        SinkKind::Postgres(_) => Some(postgres_column_defs(&sink.from, &columns)?),
        _ => None,
    };
    Ok(SinkLayout {
        columns,
        runtime_defs,
        postgres_defs,
    })
}

/// Provision the destination of one sink and register its runtime table.
///
/// # Errors
///
/// Returns a provisioning error if the destination or the runtime rejects
/// a statement.
pub async fn provision_sink(
    ctx: &mut CompileContext,
    admin: &dyn PostgresAdmin,
    sink: &SinkDef,
    layout: SinkLayout,
    dry_run: bool,
) -> Result<(), PipelineError> {
    tracing::info!(
        sink = %sink.name,
        kind = sink.kind.tag(),
        from = %sink.from,
        columns = layout.columns.len(),
        "Provisioning sink"
    );

    if let (SinkKind::Postgres(pg), Some(pg_defs)) = (&sink.kind, &layout.postgres_defs) {
        postgres::provision(admin, &sink.name, pg, pg_defs, dry_run).await?;
    }

    let sql = sink_table_statement(&sink.name, &sink.kind, &layout.runtime_defs, ctx.settings());
    ctx.issue(Stage::Sink, StatementKind::SinkTable, &sink.name, sql)
        .await?;
    ctx.register(&sink.name, layout.columns)
}

#[cfg(test)]
mod tests {
    use manuscript_types::{LogicalType, TimeAttribute};

    use super::*;

    #[test]
    fn sink_columns_skip_processing_time() {
        let mut marked = Column::new("at", LogicalType::TimestampLtz { precision: Some(3) }, false);
        marked.time_attribute = Some(TimeAttribute::ProcTime);
        let columns = vec![
            Column::new("id", LogicalType::BigInt, false),
            Column::new("my_proc_time", LogicalType::TimestampLtz { precision: Some(3) }, false),
            marked,
        ];
        let kept: Vec<_> = sink_columns(&columns).into_iter().map(|c| c.name).collect();
        assert_eq!(kept, vec!["id"]);
    }
}
