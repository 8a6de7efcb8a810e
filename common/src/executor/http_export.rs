// HTTP export executor: downloads an export document from an HTTP source and
// writes it into a destination directory
//
// Dependency policy:
// - required: the export download (retried with backoff), the destination write
// - optional: the `health_url` probe; a failure is logged as a warning

use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::config::HttpExportConfig;
use crate::errors::{ExecutionError, ExecutorFault, ValidationError};
use crate::executor::MigrationExecutor;
use crate::job::MigrationJob;
use crate::models::{MigrationConfig, ValidationResult};
use crate::retry::{ExponentialBackoff, RetryStrategy};
use crate::validation::{ConfigInspector, Section};

pub const EXECUTOR_TYPE: &str = "http_to_filesystem";

const PHASES: [&str; 3] = [
    "Check source availability",
    "Download export",
    "Write artifacts",
];

const DEFAULT_FILE_NAME: &str = "export.json";

#[derive(Debug, Deserialize)]
struct ExportSource {
    url: String,
    #[serde(default)]
    headers: Option<HashMap<String, String>>,
    #[serde(default)]
    bearer_token: Option<String>,
    #[serde(default)]
    health_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExportDestination {
    path: PathBuf,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    overwrite: Option<bool>,
}

impl ExportDestination {
    fn target(&self) -> PathBuf {
        self.path
            .join(self.file_name.as_deref().unwrap_or(DEFAULT_FILE_NAME))
    }
}

/// Failure of a single download attempt
#[derive(Debug)]
struct FetchError {
    message: String,
    retryable: bool,
}

/// HttpExportExecutor migrates an HTTP export endpoint into a local directory
pub struct HttpExportExecutor {
    client: Client,
    retry_strategy: Arc<dyn RetryStrategy>,
}

impl HttpExportExecutor {
    /// Create a new HttpExportExecutor from its settings
    pub fn new(config: &HttpExportConfig) -> Result<Self, ExecutionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| {
                ExecutionError::Internal(format!("Failed to create HTTP client: {}", e))
            })?;

        let retry_strategy = ExponentialBackoff::with_config(
            Duration::from_millis(config.retry_base_delay_ms),
            Duration::from_secs(30),
            0.1,
            config.max_attempts,
        );

        Ok(Self {
            client,
            retry_strategy: Arc::new(retry_strategy),
        })
    }

    /// Replace the retry strategy used for the export download
    pub fn with_retry_strategy(mut self, retry_strategy: Arc<dyn RetryStrategy>) -> Self {
        self.retry_strategy = retry_strategy;
        self
    }

    fn check_url(inspector: &mut ConfigInspector<'_>, field: &str, raw: &str) {
        match Url::parse(raw) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => inspector.error(ValidationError::invalid(
                field,
                format!("unsupported scheme '{}', expected http or https", url.scheme()),
            )),
            Err(e) => inspector.error(ValidationError::invalid(field, e.to_string())),
        }
    }

    /// Probe the optional health endpoint
    #[tracing::instrument(skip(self))]
    async fn probe(&self, health_url: &str) -> Result<u16, String> {
        let response = self
            .client
            .get(health_url)
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;
        let status = response.status();
        if status.is_success() {
            Ok(status.as_u16())
        } else {
            Err(format!("status {}", status.as_u16()))
        }
    }

    /// One download attempt
    #[tracing::instrument(skip(self, source), fields(url = %source.url))]
    async fn fetch(&self, source: &ExportSource) -> Result<Vec<u8>, FetchError> {
        let mut request = self.client.get(&source.url);
        for (key, value) in source.headers.iter().flatten() {
            request = request.header(key, value);
        }
        if let Some(token) = &source.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| FetchError {
            message: format!("HTTP request failed: {}", e),
            retryable: true,
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError {
                message: format!(
                    "HTTP request failed with status {}: {}",
                    status.as_u16(),
                    body
                ),
                retryable: status.is_server_error() || status.as_u16() == 429,
            });
        }

        let body = response.bytes().await.map_err(|e| FetchError {
            message: format!("Failed to read response body: {}", e),
            retryable: true,
        })?;
        Ok(body.to_vec())
    }

    /// Download with retries; every attempt and backoff sleep is cancellable
    async fn download(
        &self,
        job: &MigrationJob,
        source: &ExportSource,
    ) -> Result<Vec<u8>, ExecutionError> {
        let max_attempts = self.retry_strategy.max_attempts();
        let mut attempts = 0;

        loop {
            attempts += 1;
            job.checkpoint()?;

            let err = match job.run_cancellable(self.fetch(source)).await? {
                Ok(body) => return Ok(body),
                Err(err) => err,
            };

            let delay = if err.retryable {
                self.retry_strategy.next_delay(attempts)
            } else {
                None
            };

            match delay {
                Some(delay) => {
                    job.log_warning(format!(
                        "Download attempt {}/{} failed: {}; retrying in {}ms",
                        attempts,
                        max_attempts,
                        err.message,
                        delay.as_millis()
                    ));
                    job.run_cancellable(tokio::time::sleep(delay)).await?;
                }
                None => {
                    return Err(ExecutionError::external(
                        "export download",
                        format!("{} (after {} attempt(s))", err.message, attempts),
                    ));
                }
            }
        }
    }
}

/// Write the payload into the destination directory; JSON is pretty-printed
async fn write_artifact(destination: &ExportDestination, body: &[u8]) -> io::Result<PathBuf> {
    tokio::fs::create_dir_all(&destination.path).await?;

    let target = destination.target();
    let contents = match serde_json::from_slice::<Value>(body) {
        Ok(value) => serde_json::to_vec_pretty(&value).unwrap_or_else(|_| body.to_vec()),
        Err(_) => body.to_vec(),
    };

    if destination.overwrite.unwrap_or(false) {
        tokio::fs::write(&target, contents).await?;
        return Ok(target);
    }

    // create_new makes the existence check and the create one atomic step
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&target)
        .await
        .map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists and overwrite is disabled", target.display()),
            ),
            _ => e,
        })?;
    file.write_all(&contents).await?;
    file.flush().await?;
    Ok(target)
}

fn is_plain_file_name(name: &str) -> bool {
    let path = Path::new(name);
    path.file_name().map(|f| f == path.as_os_str()).unwrap_or(false) && name != ".."
}

#[async_trait]
impl MigrationExecutor for HttpExportExecutor {
    fn executor_type(&self) -> &str {
        EXECUTOR_TYPE
    }

    fn phases(&self) -> Vec<String> {
        PHASES.iter().map(|p| p.to_string()).collect()
    }

    #[tracing::instrument(skip(self, config))]
    async fn validate(&self, config: &MigrationConfig) -> Result<ValidationResult, ExecutorFault> {
        let mut inspector = ConfigInspector::new(config);

        if let Some(url) = inspector.require_str(Section::Source, "url") {
            Self::check_url(&mut inspector, "source.url", url);
        }
        if let Some(headers) = inspector.optional_object(Section::Source, "headers") {
            for (name, value) in headers {
                let field = format!("source.headers.{}", name);
                if HeaderName::from_bytes(name.as_bytes()).is_err() {
                    inspector.error(ValidationError::invalid(field, "not a valid header name"));
                    continue;
                }
                match value.as_str() {
                    Some(v) if HeaderValue::from_str(v).is_ok() => {}
                    Some(_) => inspector.error(ValidationError::invalid(
                        field,
                        "not a valid header value",
                    )),
                    None => inspector.error(ValidationError::invalid(field, "expected a string")),
                }
            }
        }
        if inspector
            .optional_str(Section::Source, "bearer_token")
            .is_some()
        {
            inspector.warn(
                "source.bearer_token is used for the download but credentials are not migrated to the destination",
            );
        }
        if let Some(health_url) = inspector.optional_str(Section::Source, "health_url") {
            Self::check_url(&mut inspector, "source.health_url", health_url);
        }

        inspector.require_str(Section::Destination, "path");
        if let Some(file_name) = inspector.optional_str(Section::Destination, "file_name") {
            if !is_plain_file_name(file_name) {
                inspector.error(ValidationError::invalid(
                    "destination.file_name",
                    "must be a plain file name without directories",
                ));
            }
        }
        inspector.optional_bool(Section::Destination, "overwrite");

        inspector.warn("Non-JSON payloads are written verbatim; JSON payloads are pretty-printed");

        Ok(inspector.finish())
    }

    #[tracing::instrument(skip_all, fields(job_id = %job.id()))]
    async fn execute(
        &self,
        job: &MigrationJob,
        config: &MigrationConfig,
    ) -> Result<(), ExecutionError> {
        let source: ExportSource = config
            .decode_source()
            .map_err(|e| ExecutionError::InvalidConfiguration(e.to_string()))?;
        let destination: ExportDestination = config
            .decode_destination()
            .map_err(|e| ExecutionError::InvalidConfiguration(e.to_string()))?;

        // Phase 1: optional availability probe
        job.checkpoint()?;
        job.emit_phase(PHASES[0], 1);
        match &source.health_url {
            Some(health_url) => match job.run_cancellable(self.probe(health_url)).await? {
                Ok(status) => job.log_info(format!("Source health check returned {}", status)),
                Err(e) => job.log_warning(format!(
                    "Source health check failed, continuing: {}",
                    e
                )),
            },
            None => job.log_info("No health_url configured, skipping availability probe"),
        }
        job.emit_progress(10, "Source check finished");

        // Phase 2: required download
        job.checkpoint()?;
        job.emit_phase(PHASES[1], 2);
        job.emit_progress(15, format!("Downloading {}", source.url));
        let body = self.download(job, &source).await?;
        job.emit_progress(70, format!("Downloaded {} bytes", body.len()));

        // Phase 3: required destination write
        job.checkpoint()?;
        job.emit_phase(PHASES[2], 3);
        let target = job
            .run_cancellable(write_artifact(&destination, &body))
            .await?
            .map_err(|e| ExecutionError::external("destination filesystem", e.to_string()))?;
        job.log_info(format!("Wrote {}", target.display()));
        job.emit_progress(100, "Artifacts written");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventKind, Severity};
    use crate::retry::FixedDelay;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn executor() -> HttpExportExecutor {
        HttpExportExecutor::new(&HttpExportConfig::default())
            .unwrap()
            .with_retry_strategy(Arc::new(FixedDelay::new(Duration::from_millis(10), 3)))
    }

    fn config(source: Value, destination: Value) -> MigrationConfig {
        serde_json::from_value(json!({ "source": source, "destination": destination })).unwrap()
    }

    fn job() -> MigrationJob {
        MigrationJob::new(EXECUTOR_TYPE, executor().phases())
    }

    fn phase_indices(job: &MigrationJob) -> Vec<usize> {
        job.events()
            .into_iter()
            .filter_map(|e| match e.kind {
                EventKind::PhaseChanged { index, .. } => Some(index),
                _ => None,
            })
            .collect()
    }

    fn warnings(job: &MigrationJob) -> Vec<String> {
        job.events()
            .into_iter()
            .filter_map(|e| match e.kind {
                EventKind::Log {
                    severity: Severity::Warning,
                    message,
                } => Some(message),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_validate_reports_every_missing_key() {
        let result = executor()
            .validate(&config(json!({}), json!({})))
            .await
            .unwrap();

        assert!(!result.valid);
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors.iter().any(|e| e.contains("source.url")));
        assert!(result.errors.iter().any(|e| e.contains("destination.path")));
    }

    #[tokio::test]
    async fn test_validate_rejects_bad_values() {
        let result = executor()
            .validate(&config(
                json!({ "url": "ftp://example.com/export", "headers": { "X-Count": 3 } }),
                json!({ "path": "/tmp/out", "file_name": "../escape.json", "overwrite": "no" }),
            ))
            .await
            .unwrap();

        assert!(!result.valid);
        assert_eq!(result.errors.len(), 4);
        assert!(result.errors.iter().any(|e| e.contains("source.url")));
        assert!(result.errors.iter().any(|e| e.contains("source.headers.X-Count")));
        assert!(result.errors.iter().any(|e| e.contains("destination.file_name")));
        assert!(result.errors.iter().any(|e| e.contains("destination.overwrite")));
    }

    #[tokio::test]
    async fn test_validate_warns_about_credentials() {
        let cfg = config(
            json!({ "url": "https://example.com/export", "bearer_token": "secret" }),
            json!({ "path": "/tmp/out" }),
        );
        let first = executor().validate(&cfg).await.unwrap();
        let second = executor().validate(&cfg).await.unwrap();

        assert!(first.valid);
        assert!(first.warnings.iter().any(|w| w.contains("credentials")));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_execute_writes_export() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/export"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "records": [1, 2, 3] })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let cfg = config(
            json!({
                "url": format!("{}/export", server.uri()),
                "health_url": format!("{}/health", server.uri()),
                "bearer_token": "secret"
            }),
            json!({ "path": dir.path().join("out") }),
        );

        let job = job();
        executor().execute(&job, &cfg).await.unwrap();

        let written = std::fs::read_to_string(dir.path().join("out").join(DEFAULT_FILE_NAME)).unwrap();
        let value: Value = serde_json::from_str(&written).unwrap();
        assert_eq!(value, json!({ "records": [1, 2, 3] }));
        assert_eq!(phase_indices(&job), vec![1, 2, 3]);
        assert_eq!(job.progress(), 100);
    }

    #[tokio::test]
    async fn test_failed_health_probe_is_only_a_warning() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/export"))
            .respond_with(ResponseTemplate::new(200).set_body_string("plain text"))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let cfg = config(
            json!({
                "url": format!("{}/export", server.uri()),
                "health_url": format!("{}/health", server.uri())
            }),
            json!({ "path": dir.path(), "file_name": "dump.txt" }),
        );

        let job = job();
        executor().execute(&job, &cfg).await.unwrap();

        assert!(warnings(&job).iter().any(|w| w.contains("health check failed")));
        let written = std::fs::read_to_string(dir.path().join("dump.txt")).unwrap();
        assert_eq!(written, "plain text");
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/export"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let cfg = config(
            json!({ "url": format!("{}/export", server.uri()) }),
            json!({ "path": dir.path() }),
        );

        let job = job();
        let err = executor().execute(&job, &cfg).await.unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::ExternalDependency { ref dependency, .. } if dependency == "export download"
        ));
        assert_eq!(phase_indices(&job), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/export"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/export"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let cfg = config(
            json!({ "url": format!("{}/export", server.uri()) }),
            json!({ "path": dir.path() }),
        );

        let job = job();
        executor().execute(&job, &cfg).await.unwrap();
        assert!(warnings(&job).iter().any(|w| w.contains("attempt 1/3")));
    }

    #[tokio::test]
    async fn test_existing_file_without_overwrite_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/export"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(DEFAULT_FILE_NAME), "old").unwrap();
        let cfg = config(
            json!({ "url": format!("{}/export", server.uri()) }),
            json!({ "path": dir.path() }),
        );

        let err = executor().execute(&job(), &cfg).await.unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::ExternalDependency { ref dependency, .. } if dependency == "destination filesystem"
        ));
        assert_eq!(
            std::fs::read_to_string(dir.path().join(DEFAULT_FILE_NAME)).unwrap(),
            "old"
        );
    }

    #[tokio::test]
    async fn test_concurrent_writes_without_overwrite_create_once() {
        let dir = TempDir::new().unwrap();
        let destination = ExportDestination {
            path: dir.path().to_path_buf(),
            file_name: Some("orders.json".to_string()),
            overwrite: None,
        };

        let (first, second) = tokio::join!(
            write_artifact(&destination, br#"{"writer":1}"#),
            write_artifact(&destination, br#"{"writer":2}"#),
        );

        let results = [first, second];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let err = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert!(err.to_string().contains("overwrite is disabled"));

        let written: Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("orders.json")).unwrap())
                .unwrap();
        assert!(written["writer"] == 1 || written["writer"] == 2);
    }

    #[tokio::test]
    async fn test_cancel_aborts_pending_download() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/export"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let cfg = config(
            json!({ "url": format!("{}/export", server.uri()) }),
            json!({ "path": dir.path() }),
        );

        let job = Arc::new(job());
        let canceller = Arc::clone(&job);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let err = executor().execute(&job, &cfg).await.unwrap_err();
        assert_eq!(err, ExecutionError::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(job.progress() < 100);
    }

    #[test]
    fn test_plain_file_name() {
        assert!(is_plain_file_name("export.json"));
        assert!(!is_plain_file_name("../export.json"));
        assert!(!is_plain_file_name("nested/export.json"));
        assert!(!is_plain_file_name(".."));
    }
}
