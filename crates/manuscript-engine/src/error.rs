//! Pipeline error model.
//!
//! Every variant is fatal to the build: the first error aborts the
//! remaining stages. Errors raised while talking to an external system
//! carry the originating [`Stage`] and, where one exists, the generated
//! statement text.

use std::fmt;

use serde::Serialize;

/// Build stage that produced an error or a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Load,
    Validate,
    Session,
    Source,
    Transform,
    Sink,
    Submit,
    Execute,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Load => "load",
            Self::Validate => "validate",
            Self::Session => "session",
            Self::Source => "source",
            Self::Transform => "transform",
            Self::Sink => "sink",
            Self::Submit => "submit",
            Self::Execute => "execute",
        };
        f.write_str(s)
    }
}

fn statement_suffix(statement: &Option<String>) -> String {
    match statement {
        Some(sql) => format!("\n  statement: {sql}"),
        None => String::new(),
    }
}

/// Categorized, fatal pipeline build error.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Malformed document, missing field, unresolved placeholder,
    /// duplicate name or forward reference.
    #[error("config error: {0}")]
    Config(String),

    #[error("unsupported source type '{type_tag}' for source '{source_name}'")]
    UnsupportedSourceType {
        source_name: String,
        type_tag: String,
    },

    #[error("unsupported sink type '{type_tag}' for sink '{sink}'")]
    UnsupportedSinkType { sink: String, type_tag: String },

    #[error("unsupported type '{type_name}' for column '{column}' of view '{view}'")]
    UnsupportedType {
        view: String,
        column: String,
        type_name: String,
    },

    #[error("template error in transform '{transform}': {message}")]
    Template { transform: String, message: String },

    /// The runtime rejected a compiled statement.
    #[error("{stage} stage failed for '{target}': {message}\n  statement: {statement}")]
    Compile {
        stage: Stage,
        target: String,
        statement: String,
        message: String,
    },

    #[error("provisioning sink '{sink}' failed: {message}{}", statement_suffix(.statement))]
    Provisioning {
        sink: String,
        statement: Option<String>,
        message: String,
    },

    #[error("{stage} stage failed: {message}{}", statement_suffix(.statement))]
    Execution {
        stage: Stage,
        statement: Option<String>,
        message: String,
    },
}

impl PipelineError {
    /// Stage the error originated from.
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            Self::Config(_) | Self::UnsupportedSourceType { .. } | Self::UnsupportedSinkType { .. } => {
                Stage::Validate
            }
            Self::Template { .. } => Stage::Transform,
            Self::UnsupportedType { .. } | Self::Provisioning { .. } => Stage::Sink,
            Self::Compile { stage, .. } | Self::Execution { stage, .. } => *stage,
        }
    }

    /// Generated statement text attached to the error, if any.
    #[must_use]
    pub fn statement(&self) -> Option<&str> {
        match self {
            Self::Compile { statement, .. } => Some(statement),
            Self::Provisioning { statement, .. } | Self::Execution { statement, .. } => {
                statement.as_deref()
            }
            _ => None,
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
