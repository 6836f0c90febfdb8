use crate::model::Scope;
use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command as TokioCommand;
use tokio::time::{Duration, timeout};
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum AwsCliError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{service} {operation} timed out after {seconds}s")]
    Timeout {
        service: String,
        operation: String,
        seconds: u64,
    },
    #[error("access denied: {stderr}")]
    AccessDenied { stderr: String },
    #[error("not found: {stderr}")]
    NotFound { stderr: String },
    #[error("aws exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("failed to decode aws output: {0}")]
    Decode(#[from] serde_json::Error),
}

/// One request/response call against a cloud API in the current scope.
#[async_trait]
pub trait AwsTransport: Send + Sync {
    fn scope(&self) -> &Scope;

    /// Executable used for interactive sessions handed the terminal.
    fn program(&self) -> &str {
        "aws"
    }

    async fn call(
        &self,
        service: &str,
        operation: &str,
        args: &[String],
    ) -> Result<Value, AwsCliError>;
}

/// Transport backed by the `aws` command line, JSON output.
#[derive(Debug, Clone)]
pub struct CliTransport {
    binary: String,
    scope: Scope,
    call_timeout: Duration,
}

impl CliTransport {
    pub fn new(binary: impl Into<String>, scope: Scope, call_timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            scope,
            call_timeout,
        }
    }
}

#[async_trait]
impl AwsTransport for CliTransport {
    fn scope(&self) -> &Scope {
        &self.scope
    }

    fn program(&self) -> &str {
        &self.binary
    }

    async fn call(
        &self,
        service: &str,
        operation: &str,
        args: &[String],
    ) -> Result<Value, AwsCliError> {
        let mut cmd = TokioCommand::new(&self.binary);
        cmd.arg(service)
            .arg(operation)
            .args(args)
            .args(scope_args(&self.scope))
            .arg("--output")
            .arg("json")
            .env("AWS_PAGER", "")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("aws {service} {operation} scope={}", self.scope);
        let output = match timeout(self.call_timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(AwsCliError::Spawn {
                    program: self.binary.clone(),
                    source,
                });
            }
            Err(_) => {
                warn!("aws {service} {operation} timed out");
                return Err(AwsCliError::Timeout {
                    service: service.to_string(),
                    operation: operation.to_string(),
                    seconds: self.call_timeout.as_secs(),
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(&output.status.to_string(), &stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&stdout)?)
    }
}

pub fn scope_args(scope: &Scope) -> Vec<String> {
    vec![
        "--profile".to_string(),
        scope.profile.clone(),
        "--region".to_string(),
        scope.region.clone(),
    ]
}

pub fn classify_failure(status: &str, stderr: &str) -> AwsCliError {
    let stderr = summarize_stderr(stderr);
    const DENIED: [&str; 6] = [
        "AccessDenied",
        "UnauthorizedOperation",
        "UnrecognizedClientException",
        "InvalidClientTokenId",
        "ExpiredToken",
        "The config profile",
    ];
    const MISSING: [&str; 4] = ["NotFound", "NoSuch", "does not exist", "not found"];

    if DENIED.iter().any(|marker| stderr.contains(marker)) {
        AwsCliError::AccessDenied { stderr }
    } else if MISSING.iter().any(|marker| stderr.contains(marker)) {
        AwsCliError::NotFound { stderr }
    } else {
        AwsCliError::Failed {
            status: status.to_string(),
            stderr,
        }
    }
}

fn summarize_stderr(stderr: &str) -> String {
    stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .unwrap_or("no error output")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::{AwsCliError, classify_failure, scope_args};
    use crate::model::Scope;

    #[test]
    fn access_denied_is_classified() {
        let error = classify_failure(
            "exit status: 254",
            "\nAn error occurred (AccessDeniedException) when calling the ListClusters operation\n",
        );
        assert!(matches!(error, AwsCliError::AccessDenied { .. }));
    }

    #[test]
    fn missing_resource_is_classified() {
        let error = classify_failure(
            "exit status: 254",
            "An error occurred (NoSuchBucketPolicy) when calling the GetBucketPolicy operation",
        );
        assert!(matches!(error, AwsCliError::NotFound { .. }));
    }

    #[test]
    fn other_failures_keep_last_stderr_line() {
        let error = classify_failure("exit status: 2", "usage: aws\n\naws: error: bad flag\n");
        match error {
            AwsCliError::Failed { stderr, .. } => assert_eq!(stderr, "aws: error: bad flag"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn scope_args_carry_profile_and_region() {
        assert_eq!(
            scope_args(&Scope::new("dev", "eu-west-1")),
            vec!["--profile", "dev", "--region", "eu-west-1"]
        );
    }
}
