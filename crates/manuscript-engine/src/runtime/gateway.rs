//! SQL Gateway REST client.
//!
//! Statements run inside one gateway session opened at connect time.
//! Submitted jobs are followed through the JobManager REST API.

use std::time::Duration;

use async_trait::async_trait;
use manuscript_types::Column;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{JobHandle, JobId, JobState, RuntimeError, TableRuntime};
use crate::settings::EngineSettings;
use crate::sql::quote_ident;

const SESSION_NAME: &str = "manuscript";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    session_handle: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResponse {
    operation_handle: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FetchResponse {
    result_type: String,
    next_result_uri: Option<String>,
    #[serde(rename = "jobID")]
    job_id: Option<String>,
    results: Option<ResultSet>,
}

#[derive(Debug, Default, Deserialize)]
struct ResultSet {
    #[serde(default)]
    columns: Vec<ResultColumn>,
    #[serde(default)]
    data: Vec<ResultRow>,
}

#[derive(Debug, Deserialize)]
struct ResultColumn {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ResultRow {
    #[serde(default)]
    fields: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    errors: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct JobDetails {
    state: String,
}

#[derive(Debug, Default, Deserialize)]
struct JobExceptions {
    #[serde(rename = "root-exception")]
    root_exception: Option<String>,
}

/// All rows of one operation, with the column names of the result.
#[derive(Debug, Default)]
struct Rows {
    columns: Vec<String>,
    data: Vec<Vec<Value>>,
    job_id: Option<String>,
}

/// [`TableRuntime`] backed by a Flink SQL Gateway session.
pub struct SqlGatewayRuntime {
    http: reqwest::Client,
    gateway_url: String,
    jobmanager_url: String,
    session: String,
    poll_interval: Duration,
}

impl SqlGatewayRuntime {
    /// Open a gateway session.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway is unreachable or refuses the session.
    pub async fn connect(settings: &EngineSettings) -> Result<Self, RuntimeError> {
        let http = reqwest::Client::new();
        let gateway_url = settings.gateway_url.trim_end_matches('/').to_string();
        let response = http
            .post(format!("{gateway_url}/v1/sessions"))
            .json(&json!({ "sessionName": SESSION_NAME }))
            .send()
            .await?;
        let session: SessionResponse = parse(response).await?;
        tracing::info!(gateway = %gateway_url, session = %session.session_handle, "Opened gateway session");
        Ok(Self {
            http,
            gateway_url,
            jobmanager_url: settings.jobmanager_url.trim_end_matches('/').to_string(),
            session: session.session_handle,
            poll_interval: settings.poll_interval,
        })
    }

    /// Close the gateway session. Submitted jobs keep running.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway rejects the request.
    pub async fn close(self) -> Result<(), RuntimeError> {
        let response = self
            .http
            .delete(format!("{}/v1/sessions/{}", self.gateway_url, self.session))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    fn operation_url(&self, operation: &str) -> String {
        format!(
            "{}/v1/sessions/{}/operations/{operation}",
            self.gateway_url, self.session
        )
    }

    async fn submit(&self, sql: &str) -> Result<String, RuntimeError> {
        let response = self
            .http
            .post(format!("{}/v1/sessions/{}/statements", self.gateway_url, self.session))
            .json(&json!({ "statement": sql }))
            .send()
            .await?;
        let op: OperationResponse = parse(response).await?;
        Ok(op.operation_handle)
    }

    /// Poll the operation until it leaves the running states.
    async fn wait_finished(&self, operation: &str) -> Result<(), RuntimeError> {
        loop {
            let response = self
                .http
                .get(format!("{}/status", self.operation_url(operation)))
                .send()
                .await?;
            let status: StatusResponse = parse(response).await?;
            match status.status.as_str() {
                "FINISHED" => return Ok(()),
                "INITIALIZED" | "PENDING" | "RUNNING" => {
                    tokio::time::sleep(self.poll_interval).await;
                }
                // The result endpoint carries the failure cause.
                "ERROR" => {
                    self.fetch_page(&format!("{}/result/0?rowFormat=JSON", self.operation_url(operation)))
                        .await?;
                    return Err(RuntimeError::Rejected(format!(
                        "operation {operation} failed"
                    )));
                }
                other => {
                    return Err(RuntimeError::Rejected(format!(
                        "operation {operation} ended in state {other}"
                    )));
                }
            }
        }
    }

    async fn fetch_page(&self, url: &str) -> Result<FetchResponse, RuntimeError> {
        let response = self.http.get(url).send().await?;
        parse(response).await
    }

    /// Fetch every result page of a finished operation.
    async fn fetch_all(&self, operation: &str) -> Result<Rows, RuntimeError> {
        let mut rows = Rows::default();
        let mut next = Some(format!("{}/result/0?rowFormat=JSON", self.operation_url(operation)));

        while let Some(url) = next.take() {
            let page = self.fetch_page(&url).await?;
            if rows.job_id.is_none() {
                rows.job_id = page.job_id;
            }
            let set = page.results.unwrap_or_default();
            if rows.columns.is_empty() {
                rows.columns = set.columns.into_iter().map(|c| c.name).collect();
            }
            rows.data.extend(set.data.into_iter().map(|r| r.fields));

            match page.result_type.as_str() {
                "EOS" => break,
                "NOT_READY" => {
                    tokio::time::sleep(self.poll_interval).await;
                    next = Some(url);
                }
                _ => {
                    next = page
                        .next_result_uri
                        .map(|uri| format!("{}{uri}", self.gateway_url));
                }
            }
        }
        Ok(rows)
    }

    async fn job_state(&self, job: &JobId) -> Result<String, RuntimeError> {
        let response = self
            .http
            .get(format!("{}/jobs/{job}", self.jobmanager_url))
            .send()
            .await?;
        let details: JobDetails = parse(response).await?;
        Ok(details.state)
    }

    async fn root_exception(&self, job: &JobId) -> String {
        let fetched = async {
            let response = self
                .http
                .get(format!("{}/jobs/{job}/exceptions", self.jobmanager_url))
                .send()
                .await?;
            parse::<JobExceptions>(response).await
        };
        match fetched.await {
            Ok(JobExceptions {
                root_exception: Some(cause),
            }) => cause,
            Ok(_) => "job failed without a reported cause".to_string(),
            Err(e) => format!("job failed; cause unavailable: {e}"),
        }
    }
}

#[async_trait]
impl TableRuntime for SqlGatewayRuntime {
    async fn execute_statement(&self, sql: &str) -> Result<(), RuntimeError> {
        let operation = self.submit(sql).await?;
        self.wait_finished(&operation).await
    }

    async fn describe(&self, name: &str) -> Result<Vec<Column>, RuntimeError> {
        let operation = self.submit(&format!("DESCRIBE {}", quote_ident(name))).await?;
        self.wait_finished(&operation).await?;
        let rows = self.fetch_all(&operation).await?;
        columns_from_describe(&rows.columns, &rows.data)
    }

    async fn submit_insert(&self, sql: &str) -> Result<JobHandle, RuntimeError> {
        let operation = self.submit(sql).await?;
        Ok(JobHandle {
            operation,
            statement: sql.to_string(),
        })
    }

    async fn await_accepted(&self, handle: JobHandle) -> Result<JobId, RuntimeError> {
        self.wait_finished(&handle.operation).await?;
        let rows = self.fetch_all(&handle.operation).await?;
        if let Some(id) = rows.job_id {
            return Ok(JobId(id));
        }
        // Older gateways report the job id as the single result row.
        rows.data
            .first()
            .and_then(|row| row.first())
            .and_then(Value::as_str)
            .map(|id| JobId(id.to_string()))
            .ok_or_else(|| {
                RuntimeError::Protocol(format!(
                    "no job id returned for operation {}",
                    handle.operation
                ))
            })
    }

    async fn execute(&self, pipeline: &str, jobs: &[JobId]) -> Result<JobState, RuntimeError> {
        tracing::info!(pipeline, jobs = jobs.len(), "Waiting for pipeline jobs");
        loop {
            let mut finished = 0;
            for job in jobs {
                match self.job_state(job).await?.as_str() {
                    "FINISHED" => finished += 1,
                    "FAILED" => {
                        let reason = self.root_exception(job).await;
                        return Ok(JobState::Failed {
                            job: job.clone(),
                            reason,
                        });
                    }
                    "CANCELED" | "CANCELLING" => return Ok(JobState::Canceled),
                    _ => {}
                }
            }
            if finished == jobs.len() {
                return Ok(JobState::Finished);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// Convert `DESCRIBE` rows (`name`, `type`, `null`, ...) into columns.
fn columns_from_describe(names: &[String], data: &[Vec<Value>]) -> Result<Vec<Column>, RuntimeError> {
    let position = |wanted: &str| names.iter().position(|n| n.eq_ignore_ascii_case(wanted));
    let (Some(name_idx), Some(type_idx)) = (position("name"), position("type")) else {
        return Err(RuntimeError::Protocol(format!(
            "DESCRIBE result lacks name/type columns: {names:?}"
        )));
    };
    let null_idx = position("null");

    data.iter()
        .map(|row| {
            let text = |idx: usize| row.get(idx).and_then(Value::as_str);
            let (Some(name), Some(raw_type)) = (text(name_idx), text(type_idx)) else {
                return Err(RuntimeError::Protocol(format!("malformed DESCRIBE row: {row:?}")));
            };
            let mut column = Column::from_type_string(name, raw_type)?;
            if let Some(nullable) = null_idx.and_then(|i| row.get(i)).and_then(Value::as_bool) {
                column.nullable = nullable;
            }
            Ok(column)
        })
        .collect()
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, RuntimeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let errors = serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| e.errors)
        .unwrap_or_default();
    let message = if errors.is_empty() {
        format!("{status}: {body}")
    } else {
        errors.join("\n")
    };
    Err(RuntimeError::Rejected(message))
}

async fn parse<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, RuntimeError> {
    let response = check(response).await?;
    let body = response.text().await?;
    serde_json::from_str(&body)
        .map_err(|e| RuntimeError::Protocol(format!("{e}: {body}")))
}

#[cfg(test)]
mod tests {
    use manuscript_types::{LogicalType, TimeAttribute};

    use super::*;

    fn describe_columns() -> Vec<String> {
        ["name", "type", "null", "key", "extras", "watermark"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    #[test]
    fn describe_rows_become_columns() {
        let data = vec![
            vec![json!("id"), json!("BIGINT"), json!(false), json!(null), json!(null), json!(null)],
            vec![json!("amount"), json!("DECIMAL(10, 2)"), json!(true), json!(null), json!(null), json!(null)],
            vec![
                json!("proc_time"),
                json!("TIMESTAMP_LTZ(3) *PROCTIME*"),
                json!(false),
                json!(null),
                json!("AS PROCTIME()"),
                json!(null),
            ],
        ];
        let cols = columns_from_describe(&describe_columns(), &data).unwrap();
        assert_eq!(cols.len(), 3);
        assert_eq!(cols[0].data_type, LogicalType::BigInt);
        assert!(!cols[0].nullable);
        assert_eq!(cols[1].data_type, LogicalType::Decimal { precision: 10, scale: 2 });
        assert!(cols[1].nullable);
        assert_eq!(cols[2].time_attribute, Some(TimeAttribute::ProcTime));
    }

    #[test]
    fn describe_without_type_column_is_protocol_error() {
        let err = columns_from_describe(&["name".to_string()], &[]).unwrap_err();
        assert!(matches!(err, RuntimeError::Protocol(_)));
    }

    #[test]
    fn fetch_response_reads_job_id() {
        let page: FetchResponse = serde_json::from_value(json!({
            "resultType": "EOS",
            "isQueryResult": false,
            "jobID": "a1b2c3",
            "resultKind": "SUCCESS_WITH_CONTENT",
            "results": {"columns": [{"name": "job id"}], "data": []}
        }))
        .unwrap();
        assert_eq!(page.job_id.as_deref(), Some("a1b2c3"));
        assert_eq!(page.result_type, "EOS");
    }
}
