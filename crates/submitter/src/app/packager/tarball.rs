//! Gzip-compressed tar packager.

use std::io::{self, Write};

use flate2::Compression;
use flate2::write::GzEncoder;
use tar::{Builder, Header};

use super::{PackageSession, Packager, PackagerError, PackagerParams, entry_name, read_item};
use crate::domain::model::SubmittableItem;

/// Streams accepted items into a `.tar.gz` archive.
///
/// Parameters: `prefix` places every entry under a folder, `level` selects
/// the gzip level (0-9, default 6). A session dropped without
/// `end_package` never writes the tar end blocks or the gzip trailer, so
/// the destination holds a truncated archive rather than a valid one.
#[derive(Debug, Default, Clone)]
pub struct TarGzPackager;

impl Packager for TarGzPackager {
    fn start_package<'a>(
        &mut self,
        stream: &'a mut dyn Write,
        params: &PackagerParams,
    ) -> Result<Box<dyn PackageSession + 'a>, PackagerError> {
        let level = match params.get("level") {
            Some(raw) => parse_level(raw)?,
            None => Compression::default(),
        };

        let writer = SealableWriter {
            inner: stream,
            sealed: false,
        };
        let mut builder = Builder::new(GzEncoder::new(writer, level));
        builder.mode(tar::HeaderMode::Deterministic);

        Ok(Box::new(TarGzSession {
            builder,
            prefix: params.get("prefix").cloned(),
        }))
    }
}

fn parse_level(raw: &str) -> Result<Compression, PackagerError> {
    match raw.trim().parse::<u32>() {
        Ok(level) if level <= 9 => Ok(Compression::new(level)),
        _ => Err(PackagerError::InvalidParameter {
            key: "level".into(),
            reason: format!("expected 0-9, got '{raw}'"),
        }),
    }
}

/// Forwards to the destination until sealed, then discards writes.
struct SealableWriter<'a> {
    inner: &'a mut dyn Write,
    sealed: bool,
}

impl Write for SealableWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.sealed {
            return Ok(buf.len());
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.sealed {
            return Ok(());
        }
        self.inner.flush()
    }
}

struct TarGzSession<'a> {
    builder: Builder<GzEncoder<SealableWriter<'a>>>,
    prefix: Option<String>,
}

impl PackageSession for TarGzSession<'_> {
    fn add_submittable_item(&mut self, item: &SubmittableItem) -> Result<(), PackagerError> {
        let name = entry_name(self.prefix.as_deref(), item)?;
        let contents = read_item(item)?;

        let mut header = Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);

        self.builder
            .append_data(&mut header, &name, contents.as_slice())?;
        Ok(())
    }

    fn end_package(mut self: Box<Self>) -> Result<(), PackagerError> {
        self.builder.finish()?;
        let encoder = self.builder.get_mut();
        encoder.try_finish()?;
        encoder.get_mut().flush()?;
        Ok(())
    }
}

// `Builder` and `GzEncoder` both finish themselves on drop.
impl Drop for TarGzSession<'_> {
    fn drop(&mut self) {
        self.builder.get_mut().get_mut().sealed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn package(items: &[SubmittableItem], params: &PackagerParams) -> Vec<u8> {
        let mut out: Vec<u8> = Vec::new();
        {
            let mut packager = TarGzPackager;
            let mut session = packager.start_package(&mut out, params).unwrap();
            for item in items {
                session.add_submittable_item(item).unwrap();
            }
            session.end_package().unwrap();
        }
        out
    }

    #[test]
    fn archive_round_trips_entries() {
        let mut params = PackagerParams::new();
        params.insert("prefix".into(), "submission".into());
        let bytes = package(
            &[
                SubmittableItem::in_memory("src/lib.rs", "pub fn f() {}"),
                SubmittableItem::in_memory("Cargo.toml", "[package]"),
            ],
            &params,
        );

        let mut archive = tar::Archive::new(GzDecoder::new(bytes.as_slice()));
        let mut names = Vec::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let path = entry.path().unwrap().display().to_string();
            let mut body = String::new();
            entry.read_to_string(&mut body).unwrap();
            if path.ends_with("lib.rs") {
                assert_eq!(body, "pub fn f() {}");
            }
            names.push(path);
        }
        assert_eq!(names, vec!["submission/src/lib.rs", "submission/Cargo.toml"]);
    }

    #[test]
    fn dropped_session_leaves_archive_incomplete() {
        let mut out: Vec<u8> = Vec::new();
        {
            let mut session = TarGzPackager
                .start_package(&mut out, &PackagerParams::new())
                .unwrap();
            session
                .add_submittable_item(&SubmittableItem::in_memory("a.txt", "a"))
                .unwrap();
        }

        let mut decoded = Vec::new();
        let complete = GzDecoder::new(out.as_slice())
            .read_to_end(&mut decoded)
            .is_ok()
            && decoded.len() >= 1024
            && decoded[decoded.len() - 1024..].iter().all(|&byte| byte == 0);
        assert!(!complete, "{} bytes decoded", decoded.len());
    }

    #[test]
    fn climbing_entry_is_rejected_and_session_continues() {
        let mut out: Vec<u8> = Vec::new();
        {
            let mut session = TarGzPackager
                .start_package(&mut out, &PackagerParams::new())
                .unwrap();
            let err = session
                .add_submittable_item(&SubmittableItem::in_memory("../notes.txt", "n"))
                .unwrap_err();
            assert!(matches!(err, PackagerError::Item { ref path, .. } if path == "../notes.txt"));

            session
                .add_submittable_item(&SubmittableItem::in_memory("ok.txt", "ok"))
                .unwrap();
            session.end_package().unwrap();
        }

        let mut archive = tar::Archive::new(GzDecoder::new(out.as_slice()));
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|entry| entry.unwrap().path().unwrap().display().to_string())
            .collect();
        assert_eq!(names, vec!["ok.txt"]);
    }

    #[test]
    fn rejects_out_of_range_level() {
        let mut params = PackagerParams::new();
        params.insert("level".into(), "11".into());
        let mut out: Vec<u8> = Vec::new();
        let err = TarGzPackager
            .start_package(&mut out, &params)
            .err()
            .unwrap();
        assert!(matches!(err, PackagerError::InvalidParameter { .. }));
    }
}
