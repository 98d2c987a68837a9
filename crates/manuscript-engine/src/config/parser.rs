//! Pipeline YAML loading with `<<<NAME>>>` environment substitution.

use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use manuscript_types::PipelineSpec;
use regex::Regex;

use crate::config::types::RawPipelineSpec;
use crate::config::validator::validate_pipeline;
use crate::error::PipelineError;

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<<<(\w+)>>>").expect("valid placeholder regex"));

const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Substitute `<<<VAR_NAME>>>` placeholders with environment variable values.
///
/// # Errors
///
/// Returns a config error naming every referenced variable that is not set.
pub fn substitute_env_vars(input: &str) -> Result<String, PipelineError> {
    let mut missing: Vec<String> = Vec::new();

    let result = PLACEHOLDER_RE.replace_all(input, |cap: &regex::Captures<'_>| {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(val) => val,
            Err(_) => {
                if !missing.iter().any(|m| m == var_name) {
                    missing.push(var_name.to_string());
                }
                String::new()
            }
        }
    });

    if !missing.is_empty() {
        return Err(PipelineError::config(format!(
            "unresolved placeholder(s): {}",
            missing.join(", ")
        )));
    }

    Ok(result.into_owned())
}

/// Parse a pipeline YAML string (after placeholder substitution).
///
/// # Errors
///
/// Returns a config error if substitution fails or the YAML is invalid.
pub fn parse_pipeline_str(yaml_str: &str) -> Result<RawPipelineSpec, PipelineError> {
    let substituted = substitute_env_vars(yaml_str)?;
    serde_yaml::from_str(&substituted)
        .map_err(|e| PipelineError::config(format!("failed to parse pipeline YAML: {e}")))
}

/// Read the pipeline document from a local path, a `file://` URI or an
/// `http(s)://` URL.
///
/// # Errors
///
/// Returns a config error if the location cannot be read or uses an
/// unsupported scheme.
pub async fn load_spec_text(location: &str) -> Result<String, PipelineError> {
    if location.starts_with("http://") || location.starts_with("https://") {
        return fetch_remote(location).await;
    }
    let path = match location.strip_prefix("file://") {
        Some(rest) => rest,
        None if location.contains("://") => {
            return Err(PipelineError::config(format!(
                "unsupported pipeline location '{location}'"
            )));
        }
        None => location,
    };
    read_local(Path::new(path)).await
}

async fn read_local(path: &Path) -> Result<String, PipelineError> {
    tokio::fs::read_to_string(path).await.map_err(|e| {
        PipelineError::config(format!(
            "failed to read pipeline file {}: {e}",
            path.display()
        ))
    })
}

async fn fetch_remote(url: &str) -> Result<String, PipelineError> {
    let fetch_err = |e: reqwest::Error| {
        PipelineError::config(format!("failed to fetch pipeline from {url}: {e}"))
    };
    let client = reqwest::Client::builder()
        .connect_timeout(FETCH_TIMEOUT)
        .timeout(FETCH_TIMEOUT)
        .build()
        .map_err(fetch_err)?;
    let response = client
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(fetch_err)?;
    response.text().await.map_err(fetch_err)
}

/// Load, substitute, parse and validate a pipeline document.
///
/// # Errors
///
/// Returns the first loading or validation failure.
pub async fn load_pipeline(location: &str) -> Result<PipelineSpec, PipelineError> {
    let text = load_spec_text(location).await?;
    let raw = parse_pipeline_str(&text)?;
    let spec = validate_pipeline(raw)?;
    tracing::info!(
        pipeline = %spec.name,
        sources = spec.sources.len(),
        transforms = spec.transforms.len(),
        sinks = spec.sinks.len(),
        "Loaded pipeline"
    );
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn placeholder_substitution() {
        std::env::set_var("MS_TEST_HOST", "db.internal");
        let result = substitute_env_vars("host: <<<MS_TEST_HOST>>>\nport: 5432").unwrap();
        assert_eq!(result, "host: db.internal\nport: 5432");
        std::env::remove_var("MS_TEST_HOST");
    }

    #[test]
    fn repeated_placeholder_replaced_everywhere() {
        std::env::set_var("MS_TEST_REPEAT", "bar");
        let result = substitute_env_vars("<<<MS_TEST_REPEAT>>>-<<<MS_TEST_REPEAT>>>").unwrap();
        assert_eq!(result, "bar-bar");
        std::env::remove_var("MS_TEST_REPEAT");
    }

    #[test]
    fn text_without_placeholders_passes_through() {
        let input = "name: demo\nsql: SELECT '<<not a placeholder>>'";
        assert_eq!(substitute_env_vars(input).unwrap(), input);
    }

    #[test]
    fn all_missing_placeholders_reported() {
        let err = substitute_env_vars("<<<MS_MISSING_X>>> and <<<MS_MISSING_Y>>>").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("MS_MISSING_X"));
        assert!(msg.contains("MS_MISSING_Y"));
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn unset_placeholder_fails_before_yaml_parse() {
        // Invalid YAML after the placeholder: the substitution error wins.
        let err = parse_pipeline_str("name: <<<MS_MISSING_Z>>>\n: [").unwrap_err();
        assert!(err.to_string().contains("MS_MISSING_Z"));
    }

    #[test]
    fn parse_invalid_yaml_errors() {
        let err = parse_pipeline_str("this is not: [valid: yaml: {{{}}}").unwrap_err();
        assert!(err.to_string().contains("failed to parse pipeline YAML"));
    }

    #[tokio::test]
    async fn loads_from_path_and_file_uri() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "name: demo").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        assert_eq!(load_spec_text(&path).await.unwrap(), "name: demo");
        let uri = format!("file://{path}");
        assert_eq!(load_spec_text(&uri).await.unwrap(), "name: demo");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn local_reads_run_alongside_other_tasks() {
        let mut first = tempfile::NamedTempFile::new().unwrap();
        write!(first, "name: first").unwrap();
        let mut second = tempfile::NamedTempFile::new().unwrap();
        write!(second, "name: second").unwrap();
        let (a, b) = (
            first.path().to_str().unwrap().to_string(),
            second.path().to_str().unwrap().to_string(),
        );

        let (a, b) = tokio::join!(load_spec_text(&a), load_spec_text(&b));
        assert_eq!(a.unwrap(), "name: first");
        assert_eq!(b.unwrap(), "name: second");
    }

    #[tokio::test]
    async fn unknown_scheme_rejected() {
        let err = load_spec_text("s3://bucket/pipeline.yaml").await.unwrap_err();
        assert!(err.to_string().contains("unsupported pipeline location"));
    }

    #[tokio::test]
    async fn missing_file_is_config_error() {
        let err = load_spec_text("/nonexistent/manuscript/pipeline.yaml")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
