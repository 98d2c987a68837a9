//! Engine settings that are not part of the pipeline document.

use std::time::Duration;

pub const DEFAULT_GATEWAY_URL: &str = "http://localhost:8083";
pub const DEFAULT_JOBMANAGER_URL: &str = "http://localhost:8081";
pub const DEFAULT_CATALOG: &str = "paimon";
pub const DEFAULT_WAREHOUSE: &str = "file:///opt/flink/warehouse";
pub const DEFAULT_SINK_ROOT: &str = "/opt/flink/sink_file_path";

/// A user-defined function registered before sources compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDef {
    pub name: String,
    pub class: String,
}

/// Runtime endpoints and deployment-wide defaults.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// SQL gateway REST endpoint.
    pub gateway_url: String,
    /// JobManager REST endpoint used to follow submitted jobs.
    pub jobmanager_url: String,
    /// Lakehouse catalog holding the source datasets.
    pub catalog: String,
    pub warehouse: String,
    /// Root directory for filesystem sinks.
    pub sink_root: String,
    pub functions: Vec<FunctionDef>,
    pub poll_interval: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            jobmanager_url: DEFAULT_JOBMANAGER_URL.to_string(),
            catalog: DEFAULT_CATALOG.to_string(),
            warehouse: DEFAULT_WAREHOUSE.to_string(),
            sink_root: DEFAULT_SINK_ROOT.to_string(),
            functions: Vec::new(),
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl FunctionDef {
    /// Parse a `NAME=fully.qualified.Class` pair.
    ///
    /// # Errors
    ///
    /// Returns a message if the pair has no `=` or an empty side.
    pub fn parse(pair: &str) -> Result<Self, String> {
        match pair.split_once('=') {
            Some((name, class)) if !name.trim().is_empty() && !class.trim().is_empty() => {
                Ok(Self {
                    name: name.trim().to_string(),
                    class: class.trim().to_string(),
                })
            }
            _ => Err(format!("invalid function '{pair}', expected NAME=CLASS")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_pair_parses() {
        let f = FunctionDef::parse("Add = com.example.udf.Add").unwrap();
        assert_eq!(f.name, "Add");
        assert_eq!(f.class, "com.example.udf.Add");
    }

    #[test]
    fn function_pair_rejects_missing_class() {
        assert!(FunctionDef::parse("Add=").is_err());
        assert!(FunctionDef::parse("Add").is_err());
    }
}
