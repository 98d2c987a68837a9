//! Logical type to destination column type mapping.

use manuscript_types::{Column, LogicalType};

use crate::error::PipelineError;
use crate::sql::{pg_identifier, quote_ident};

/// PostgreSQL caps fractional-second precision at 6.
const PG_MAX_TIME_PRECISION: u8 = 6;

/// A logical type with no destination counterpart.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported type '{type_name}'")]
pub struct UnsupportedType {
    pub type_name: String,
}

fn reject_unsupported(dt: &LogicalType) -> Result<(), UnsupportedType> {
    match dt.find_unsupported() {
        Some(raw) => Err(UnsupportedType {
            type_name: raw.to_string(),
        }),
        None => Ok(()),
    }
}

fn pg_precision(name: &str, precision: Option<u8>) -> String {
    match precision {
        Some(p) => format!("{name}({}) WITHOUT TIME ZONE", p.min(PG_MAX_TIME_PRECISION)),
        None => format!("{name} WITHOUT TIME ZONE"),
    }
}

/// Map a logical type to a PostgreSQL column type.
///
/// # Errors
///
/// Returns [`UnsupportedType`] for types outside the supported domain,
/// including structured types that contain one.
pub fn postgres_column_type(dt: &LogicalType) -> Result<String, UnsupportedType> {
    reject_unsupported(dt)?;
    let mapped = match dt {
        LogicalType::TinyInt | LogicalType::SmallInt => "SMALLINT".to_string(),
        LogicalType::Int => "INTEGER".to_string(),
        LogicalType::BigInt => "BIGINT".to_string(),
        LogicalType::Decimal { precision, scale } => format!("NUMERIC({precision},{scale})"),
        LogicalType::Float => "REAL".to_string(),
        LogicalType::Double => "DOUBLE PRECISION".to_string(),
        LogicalType::Boolean => "BOOLEAN".to_string(),
        LogicalType::Date => "DATE".to_string(),
        LogicalType::Time { precision } => pg_precision("TIME", *precision),
        LogicalType::Timestamp { precision } | LogicalType::TimestampLtz { precision } => {
            pg_precision("TIMESTAMP", *precision)
        }
        LogicalType::Char { length } | LogicalType::Varchar { length: Some(length) } => {
            format!("VARCHAR({length})")
        }
        LogicalType::Varchar { length: None } => "TEXT".to_string(),
        LogicalType::Binary { .. } | LogicalType::Varbinary { .. } => "BYTEA".to_string(),
        // Serialized to JSON text at the insert boundary.
        LogicalType::Array { .. } | LogicalType::Row { .. } => "TEXT".to_string(),
        LogicalType::Unsupported { raw } => {
            return Err(UnsupportedType {
                type_name: raw.clone(),
            })
        }
    };
    Ok(mapped)
}

/// Map a logical type to the runtime's own type name for a sink table.
///
/// # Errors
///
/// Returns [`UnsupportedType`] for types outside the supported domain.
pub fn runtime_column_type(dt: &LogicalType) -> Result<String, UnsupportedType> {
    reject_unsupported(dt)?;
    if dt.is_structured() {
        return Ok("STRING".to_string());
    }
    Ok(dt.to_string())
}

fn map_columns(
    view: &str,
    columns: &[Column],
    map: fn(&LogicalType) -> Result<String, UnsupportedType>,
) -> Result<Vec<(String, String)>, PipelineError> {
    columns
        .iter()
        .map(|c| {
            map(&c.data_type)
                .map(|ty| (c.name.clone(), ty))
                .map_err(|e| PipelineError::UnsupportedType {
                    view: view.to_string(),
                    column: c.name.clone(),
                    type_name: e.type_name,
                })
        })
        .collect()
}

/// Column definitions for a PostgreSQL `CREATE TABLE`, non-nullable
/// columns marked `NOT NULL`.
///
/// # Errors
///
/// Returns `UnsupportedType` naming the first column that cannot be mapped.
pub fn postgres_column_defs(view: &str, columns: &[Column]) -> Result<Vec<String>, PipelineError> {
    let mapped = map_columns(view, columns, postgres_column_type)?;
    Ok(columns
        .iter()
        .zip(mapped)
        .map(|(col, (name, ty))| {
            let null = if col.nullable { "" } else { " NOT NULL" };
            format!("{} {ty}{null}", pg_identifier(&name))
        })
        .collect())
}

/// Column definitions for a runtime sink table.
///
/// # Errors
///
/// Returns `UnsupportedType` naming the first column that cannot be mapped.
pub fn runtime_column_defs(view: &str, columns: &[Column]) -> Result<Vec<String>, PipelineError> {
    let mapped = map_columns(view, columns, runtime_column_type)?;
    Ok(mapped
        .into_iter()
        .map(|(name, ty)| format!("{} {ty}", quote_ident(&name)))
        .collect())
}

#[cfg(test)]
mod tests {
    use manuscript_types::schema::RowField;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(LogicalType::TinyInt, "SMALLINT")]
    #[case(LogicalType::SmallInt, "SMALLINT")]
    #[case(LogicalType::Int, "INTEGER")]
    #[case(LogicalType::BigInt, "BIGINT")]
    #[case(LogicalType::Decimal { precision: 10, scale: 2 }, "NUMERIC(10,2)")]
    #[case(LogicalType::Float, "REAL")]
    #[case(LogicalType::Double, "DOUBLE PRECISION")]
    #[case(LogicalType::Boolean, "BOOLEAN")]
    #[case(LogicalType::Date, "DATE")]
    #[case(LogicalType::Time { precision: Some(3) }, "TIME(3) WITHOUT TIME ZONE")]
    #[case(LogicalType::Timestamp { precision: Some(3) }, "TIMESTAMP(3) WITHOUT TIME ZONE")]
    #[case(LogicalType::TimestampLtz { precision: Some(9) }, "TIMESTAMP(6) WITHOUT TIME ZONE")]
    #[case(LogicalType::Timestamp { precision: None }, "TIMESTAMP WITHOUT TIME ZONE")]
    #[case(LogicalType::Char { length: 8 }, "VARCHAR(8)")]
    #[case(LogicalType::Varchar { length: Some(64) }, "VARCHAR(64)")]
    #[case(LogicalType::Varchar { length: None }, "TEXT")]
    #[case(LogicalType::Binary { length: 16 }, "BYTEA")]
    #[case(LogicalType::Varbinary { length: None }, "BYTEA")]
    #[case(LogicalType::Array { element: Box::new(LogicalType::Int) }, "TEXT")]
    fn maps_to_postgres(#[case] dt: LogicalType, #[case] expected: &str) {
        assert_eq!(postgres_column_type(&dt).unwrap(), expected);
    }

    #[rstest]
    #[case(LogicalType::Decimal { precision: 10, scale: 2 }, "DECIMAL(10, 2)")]
    #[case(LogicalType::Varchar { length: None }, "STRING")]
    #[case(LogicalType::TimestampLtz { precision: Some(3) }, "TIMESTAMP_LTZ(3)")]
    #[case(LogicalType::Array { element: Box::new(LogicalType::Int) }, "STRING")]
    #[case(
        LogicalType::Row { fields: vec![RowField { name: "a".into(), data_type: LogicalType::Int }] },
        "STRING"
    )]
    fn maps_to_runtime(#[case] dt: LogicalType, #[case] expected: &str) {
        assert_eq!(runtime_column_type(&dt).unwrap(), expected);
    }

    #[test]
    fn unsupported_types_are_rejected_by_both_targets() {
        let map = LogicalType::Unsupported {
            raw: "MAP<STRING, INT>".into(),
        };
        assert_eq!(
            postgres_column_type(&map).unwrap_err().type_name,
            "MAP<STRING, INT>"
        );
        let nested = LogicalType::Array {
            element: Box::new(map),
        };
        assert!(runtime_column_type(&nested).is_err());
        assert!(postgres_column_type(&nested).is_err());
    }

    #[test]
    fn column_defs_name_the_offending_column() {
        let columns = vec![
            Column::new("id", LogicalType::BigInt, false),
            Column::new("attrs", LogicalType::Unsupported { raw: "MULTISET<INT>".into() }, true),
        ];
        let err = postgres_column_defs("big_events", &columns).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::UnsupportedType { ref view, ref column, ref type_name }
                if view == "big_events" && column == "attrs" && type_name == "MULTISET<INT>"
        ));
    }

    #[test]
    fn postgres_defs_mark_not_null() {
        let columns = vec![
            Column::new("id", LogicalType::BigInt, false),
            Column::new("amount", LogicalType::Decimal { precision: 10, scale: 2 }, true),
        ];
        let defs = postgres_column_defs("v", &columns).unwrap();
        assert_eq!(defs, vec!["id BIGINT NOT NULL", "amount NUMERIC(10,2)"]);
    }

    #[test]
    fn postgres_defs_fold_mixed_case_names() {
        let columns = vec![
            Column::new("blockNumber", LogicalType::BigInt, false),
            Column::new("txHash", LogicalType::Varchar { length: None }, true),
        ];
        let defs = postgres_column_defs("v", &columns).unwrap();
        assert_eq!(defs, vec!["blocknumber BIGINT NOT NULL", "txhash TEXT"]);
    }
}
