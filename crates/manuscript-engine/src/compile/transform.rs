//! Transform views.
//!
//! Each transform is created in two steps: the user SQL becomes an
//! intermediate `<name>_tmp` view, then `<name>` projects every column of
//! it except processing-time columns, which never leave a transform.

use manuscript_types::{Column, TransformDef};

use crate::context::{CompileContext, StatementKind};
use crate::error::{PipelineError, Stage};
use crate::sql::quote_ident;

/// Name of the intermediate view backing a transform.
#[must_use]
pub fn intermediate_name(transform: &str) -> String {
    format!("{transform}_tmp")
}

/// Columns visible downstream of a transform, in their original order.
#[must_use]
pub fn visible_columns(columns: &[Column]) -> Vec<Column> {
    columns
        .iter()
        .filter(|c| !c.is_processing_time())
        .cloned()
        .collect()
}

/// `CREATE TEMPORARY VIEW <name> AS SELECT <cols> FROM <name>_tmp`.
#[must_use]
pub fn projection_statement(transform: &str, columns: &[Column]) -> String {
    let cols = columns
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE TEMPORARY VIEW {} AS SELECT {cols} FROM {}",
        quote_ident(transform),
        quote_ident(&intermediate_name(transform))
    )
}

/// Compile one transform from its (already rendered) SQL.
///
/// # Errors
///
/// Returns a compile error if the runtime rejects either view or if no
/// column is left after dropping processing-time columns.
pub async fn compile_transform(
    ctx: &mut CompileContext,
    transform: &TransformDef,
    sql: &str,
) -> Result<(), PipelineError> {
    let name = transform.name.as_str();
    let tmp = intermediate_name(name);
    tracing::info!(transform = name, "Compiling transform");

    let create_tmp = format!("CREATE TEMPORARY VIEW {} AS {sql}", quote_ident(&tmp));
    ctx.issue(Stage::Transform, StatementKind::IntermediateView, name, create_tmp)
        .await?;
    let columns = ctx.describe(Stage::Transform, name, &tmp).await?;

    let visible = visible_columns(&columns);
    let dropped = columns.len() - visible.len();
    if dropped > 0 {
        tracing::debug!(transform = name, dropped, "Dropped processing-time columns");
    }
    if visible.is_empty() {
        return Err(PipelineError::Compile {
            stage: Stage::Transform,
            target: name.to_string(),
            statement: sql.to_string(),
            message: "no columns left after removing processing-time columns".to_string(),
        });
    }

    let projection = projection_statement(name, &visible);
    ctx.issue(Stage::Transform, StatementKind::TransformView, name, projection)
        .await?;
    ctx.register(name, visible)
}

#[cfg(test)]
mod tests {
    use manuscript_types::{LogicalType, TimeAttribute};

    use super::*;

    fn columns() -> Vec<Column> {
        let mut marked = Column::new("event_at", LogicalType::TimestampLtz { precision: Some(3) }, false);
        marked.time_attribute = Some(TimeAttribute::ProcTime);
        vec![
            Column::new("id", LogicalType::BigInt, false),
            Column::new("proc_time", LogicalType::TimestampLtz { precision: Some(3) }, false),
            Column::new("amount", LogicalType::Decimal { precision: 10, scale: 2 }, true),
            marked,
            Column::new("tag", LogicalType::Varchar { length: None }, true),
        ]
    }

    #[test]
    fn processing_time_columns_are_dropped_in_order() {
        let names: Vec<_> = visible_columns(&columns()).into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["id", "amount", "tag"]);
    }

    #[test]
    fn rowtime_columns_are_kept() {
        let mut rowtime = Column::new("ts", LogicalType::Timestamp { precision: Some(3) }, true);
        rowtime.time_attribute = Some(TimeAttribute::RowTime);
        assert_eq!(visible_columns(&[rowtime]).len(), 1);
    }

    #[test]
    fn projection_reads_intermediate_view() {
        let sql = projection_statement("big_events", &visible_columns(&columns()));
        assert_eq!(
            sql,
            "CREATE TEMPORARY VIEW `big_events` AS SELECT `id`, `amount`, `tag` FROM `big_events_tmp`"
        );
    }
}
