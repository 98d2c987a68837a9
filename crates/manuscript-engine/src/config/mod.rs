//! Pipeline document loading and validation.

pub mod parser;
pub mod types;
pub mod validator;

pub use parser::{load_pipeline, load_spec_text, parse_pipeline_str, substitute_env_vars};
pub use validator::validate_pipeline;
