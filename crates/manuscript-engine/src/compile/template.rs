//! Parameterized transform SQL.
//!
//! Templates use Handlebars in strict mode: referencing a parameter that
//! was not supplied is an error rather than an empty string.

use std::collections::BTreeMap;

use handlebars::Handlebars;
use manuscript_types::TransformDef;
use serde_json::Value;

use crate::error::PipelineError;

/// Render one transform template with its parameters.
///
/// # Errors
///
/// Returns a template error naming the transform if the template is
/// malformed or references a missing parameter.
pub fn render(
    transform: &str,
    template: &str,
    params: &BTreeMap<String, Value>,
) -> Result<String, PipelineError> {
    let mut registry = Handlebars::new();
    registry.set_strict_mode(true);
    registry.register_escape_fn(handlebars::no_escape);
    registry
        .render_template(template, params)
        .map_err(|e| PipelineError::Template {
            transform: transform.to_string(),
            message: e.to_string(),
        })
}

/// SQL of every transform with its template rendered, in declaration order.
///
/// Transforms without `params` are used as written.
///
/// # Errors
///
/// Returns the first template error.
pub fn render_transforms(transforms: &[TransformDef]) -> Result<Vec<String>, PipelineError> {
    transforms
        .iter()
        .map(|t| match &t.params {
            Some(params) => {
                let sql = render(&t.name, &t.sql, params)?;
                tracing::debug!(transform = %t.name, sql = %sql, "Rendered transform template");
                Ok(sql)
            }
            None => Ok(t.sql.clone()),
        })
        .collect()
}
