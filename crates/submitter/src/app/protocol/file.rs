//! `file://` transport: writes the package to a local path.

use std::fs;
use std::io::{self, Write};

use tempfile::NamedTempFile;
use tracing::debug;

use super::{Protocol, SubmissionResponse};
use crate::app::manifest::SubmissionManifest;
use crate::app::traversal::LongRunningTask;
use crate::domain::errors::SubmitError;

/// Writes the package next to its destination and renames it into place once
/// complete, so a failed or cancelled submission never leaves a partial file.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileProtocol;

impl Protocol for FileProtocol {
    fn submit(
        &self,
        manifest: &SubmissionManifest,
        task: &mut dyn LongRunningTask,
    ) -> Result<SubmissionResponse, SubmitError> {
        let assignment = manifest.assignment().name().to_owned();
        let transport = manifest.resolved_transport()?;
        let masked = manifest.resolved_transport_without_password()?.to_string();

        let destination =
            transport
                .to_file_path()
                .map_err(|()| SubmitError::TargetResolution {
                    assignment: assignment.clone(),
                    transport: masked.clone(),
                    reason: "not a local file path".into(),
                })?;

        let transfer = |source: io::Error| SubmitError::Transfer {
            assignment: assignment.clone(),
            path: None,
            source,
        };

        let parent = destination
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(|parent| parent.to_path_buf())
            .unwrap_or_else(|| ".".into());
        fs::create_dir_all(&parent).map_err(transfer)?;

        let mut staged = NamedTempFile::new_in(&parent).map_err(transfer)?;
        let report = manifest.package_contents_into_stream(staged.as_file_mut(), task)?;
        staged.as_file_mut().flush().map_err(transfer)?;
        staged
            .persist(&destination)
            .map_err(|err| transfer(err.error))?;

        debug!(path = %destination.display(), "package written");
        Ok(SubmissionResponse {
            destination: masked,
            report,
            body: None,
        })
    }
}
