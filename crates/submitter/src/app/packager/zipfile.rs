//! Zip archive packager.

use std::io::{Cursor, Write};

use zip::CompressionMethod;
use zip::ZipWriter;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;

use super::{PackageSession, Packager, PackagerError, PackagerParams, entry_name, read_item};
use crate::domain::model::SubmittableItem;

/// Writes accepted items into a deflated zip archive.
///
/// Parameters: `prefix` places every entry under a folder, `comment` sets the
/// archive comment.
#[derive(Debug, Default, Clone)]
pub struct ZipPackager;

impl Packager for ZipPackager {
    fn start_package<'a>(
        &mut self,
        stream: &'a mut dyn Write,
        params: &PackagerParams,
    ) -> Result<Box<dyn PackageSession + 'a>, PackagerError> {
        // Zip needs to seek back over local headers, so the archive is built
        // in memory and copied out on `end_package`.
        Ok(Box::new(ZipSession {
            stream,
            writer: ZipWriter::new(Cursor::new(Vec::new())),
            prefix: params.get("prefix").cloned(),
            comment: params.get("comment").cloned(),
        }))
    }
}

struct ZipSession<'a> {
    stream: &'a mut dyn Write,
    writer: ZipWriter<Cursor<Vec<u8>>>,
    prefix: Option<String>,
    comment: Option<String>,
}

impl PackageSession for ZipSession<'_> {
    fn add_submittable_item(&mut self, item: &SubmittableItem) -> Result<(), PackagerError> {
        let contents = read_item(item)?;
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o644);

        let name = entry_name(self.prefix.as_deref(), item)?;
        self.writer
            .start_file(name, options)
            .map_err(|err| map_zip_error(item, err))?;
        self.writer.write_all(&contents)?;
        Ok(())
    }

    fn end_package(self: Box<Self>) -> Result<(), PackagerError> {
        let ZipSession {
            stream,
            mut writer,
            comment,
            ..
        } = *self;

        if let Some(comment) = comment {
            writer.set_comment(comment);
        }
        let archive = writer.finish().map_err(|err| match err {
            ZipError::Io(io) => PackagerError::Io(io),
            other => PackagerError::Archive(other.to_string()),
        })?;

        stream.write_all(archive.get_ref())?;
        stream.flush()?;
        Ok(())
    }
}

fn map_zip_error(item: &SubmittableItem, err: ZipError) -> PackagerError {
    match err {
        ZipError::Io(io) => PackagerError::Io(io),
        other => PackagerError::Item {
            path: item.filename().to_owned(),
            reason: other.to_string(),
        },
    }
}
