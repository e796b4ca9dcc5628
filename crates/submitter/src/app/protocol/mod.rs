//! Transports that deliver a packaged submission to its destination.

mod file;
mod http;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::app::manifest::{PackageReport, SubmissionManifest};
use crate::app::traversal::LongRunningTask;
use crate::domain::errors::SubmitError;

pub use self::file::FileProtocol;
pub use self::http::HttpProtocol;

/// What a protocol reports back after delivering a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionResponse {
    /// Destination with the password masked.
    pub destination: String,
    pub report: PackageReport,
    /// Whatever the destination sent back, if anything.
    pub body: Option<String>,
}

/// A transport for one or more URI schemes.
///
/// Implementations package the submission themselves by calling
/// [`SubmissionManifest::package_contents_into_stream`].
pub trait Protocol: Send + Sync {
    fn submit(
        &self,
        manifest: &SubmissionManifest,
        task: &mut dyn LongRunningTask,
    ) -> Result<SubmissionResponse, SubmitError>;
}

/// Protocols keyed by URI scheme.
#[derive(Default, Clone)]
pub struct ProtocolRegistry {
    protocols: HashMap<String, Arc<dyn Protocol>>,
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `file`, `http` and `https`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("file", FileProtocol);
        let http = Arc::new(HttpProtocol::default());
        registry.register_shared("http", http.clone());
        registry.register_shared("https", http);
        registry
    }

    pub fn register(&mut self, scheme: impl Into<String>, protocol: impl Protocol + 'static) {
        self.register_shared(scheme, Arc::new(protocol));
    }

    pub fn register_shared(&mut self, scheme: impl Into<String>, protocol: Arc<dyn Protocol>) {
        self.protocols
            .insert(scheme.into().to_ascii_lowercase(), protocol);
    }

    pub fn get(&self, scheme: &str) -> Option<Arc<dyn Protocol>> {
        self.protocols.get(&scheme.to_ascii_lowercase()).cloned()
    }

    pub fn schemes(&self) -> Vec<&str> {
        let mut schemes: Vec<&str> = self.protocols.keys().map(String::as_str).collect();
        schemes.sort_unstable();
        schemes
    }
}

impl fmt::Debug for ProtocolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolRegistry")
            .field("schemes", &self.schemes())
            .finish()
    }
}

/// Validate the manifest, pick the protocol for its transport, and deliver.
pub fn submit(
    manifest: &SubmissionManifest,
    protocols: &ProtocolRegistry,
    task: &mut dyn LongRunningTask,
) -> Result<SubmissionResponse, SubmitError> {
    let assignment = manifest.assignment().name();
    let transport = manifest.resolved_transport()?;
    let masked = manifest.resolved_transport_without_password()?;

    let protocol =
        protocols
            .get(transport.scheme())
            .ok_or_else(|| SubmitError::UnsupportedProtocol {
                assignment: assignment.to_owned(),
                scheme: transport.scheme().to_owned(),
            })?;

    manifest.check_required_files()?;

    info!(assignment, destination = %masked, "submitting");
    let response = protocol.submit(manifest, task)?;
    info!(
        assignment,
        destination = %masked,
        files = response.report.included.len(),
        "submission delivered"
    );
    Ok(response)
}
