//! `http://` and `https://` transport.

use std::fmt;
use std::time::Duration;

use tracing::debug;

use super::{Protocol, SubmissionResponse};
use crate::app::manifest::SubmissionManifest;
use crate::app::traversal::LongRunningTask;
use crate::domain::errors::SubmitError;

/// Request timeout for a whole upload, connect through response body.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// POSTs the package bytes to the transport URL and returns the response body.
#[derive(Clone)]
pub struct HttpProtocol {
    agent: ureq::Agent,
    timeout: Duration,
}

impl HttpProtocol {
    pub fn with_timeout(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for HttpProtocol {
    fn default() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }
}

impl fmt::Debug for HttpProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpProtocol")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Protocol for HttpProtocol {
    fn submit(
        &self,
        manifest: &SubmissionManifest,
        task: &mut dyn LongRunningTask,
    ) -> Result<SubmissionResponse, SubmitError> {
        let transport = manifest.resolved_transport()?;
        let masked = manifest.resolved_transport_without_password()?.to_string();

        let mut package: Vec<u8> = Vec::new();
        let report = manifest.package_contents_into_stream(&mut package, task)?;
        debug!(bytes = package.len(), destination = %masked, "uploading package");

        let response = self
            .agent
            .post(transport.as_str())
            .header("Content-Type", content_type(manifest.assignment().packager()))
            .send(&package[..])
            .map_err(|err| map_ureq_error(&masked, &err))?;

        let body = response
            .into_body()
            .read_to_string()
            .map_err(|err| SubmitError::Transport {
                url: masked.clone(),
                reason: err.to_string(),
            })?;

        Ok(SubmissionResponse {
            destination: masked,
            report,
            body: Some(body),
        })
    }
}

fn content_type(packager: &str) -> &'static str {
    match packager {
        "zip" | "org.webcat.submitter.packagers.zip" => "application/zip",
        "tar.gz" | "tgz" => "application/gzip",
        _ => "application/octet-stream",
    }
}

/// `url` must already have its password masked.
fn map_ureq_error(url: &str, err: &ureq::Error) -> SubmitError {
    let reason = match err {
        ureq::Error::StatusCode(code) => format!("server answered with status {code}"),
        other => other.to_string(),
    };
    SubmitError::Transport {
        url: url.to_owned(),
        reason,
    }
}
