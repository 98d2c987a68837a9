//! Shared Manuscript types: the validated pipeline document and the
//! logical schema model used by the compiler and type mapper.

pub mod schema;
pub mod spec;

pub use schema::{parse_column_type, Column, LogicalType, SchemaError, TimeAttribute};
pub use spec::{PipelineSpec, SinkDef, SinkKind, SourceDef, SourceKind, TransformDef};
