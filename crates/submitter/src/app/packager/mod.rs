//! Pluggable packagers that serialize accepted items into one stream.

mod tarball;
mod zipfile;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::{self, Read, Write};

use crate::domain::model::SubmittableItem;

pub use self::tarball::TarGzPackager;
pub use self::zipfile::ZipPackager;

/// Packager parameters after placeholder resolution.
pub type PackagerParams = BTreeMap<String, String>;

/// Builds a fresh packager for each submission.
pub type PackagerFactory = Box<dyn Fn() -> Box<dyn Packager> + Send + Sync>;

/// Failures raised by packagers.
///
/// `Io` means the destination stream failed and the package is unusable;
/// every other variant concerns a single item or parameter.
#[derive(Debug, thiserror::Error)]
pub enum PackagerError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("cannot package '{path}': {reason}")]
    Item { path: String, reason: String },
    #[error("invalid packager parameter '{key}': {reason}")]
    InvalidParameter { key: String, reason: String },
    #[error("archive error: {0}")]
    Archive(String),
}

/// A packaging format.
pub trait Packager {
    /// Begin writing a package to `stream`, returning the session that
    /// receives the items.
    fn start_package<'a>(
        &mut self,
        stream: &'a mut dyn Write,
        params: &PackagerParams,
    ) -> Result<Box<dyn PackageSession + 'a>, PackagerError>;
}

/// An in-progress package.
pub trait PackageSession {
    fn add_submittable_item(&mut self, item: &SubmittableItem) -> Result<(), PackagerError>;

    /// Finish the package and flush the destination stream.
    fn end_package(self: Box<Self>) -> Result<(), PackagerError>;
}

/// Maps packager identifiers to factories. Passed explicitly to whoever
/// needs to create packagers.
#[derive(Default)]
pub struct PackagerRegistry {
    factories: HashMap<String, PackagerFactory>,
}

impl PackagerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `zip` and `tar.gz` packagers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("zip", || Box::new(ZipPackager::default()));
        registry.register("org.webcat.submitter.packagers.zip", || {
            Box::new(ZipPackager::default())
        });
        registry.register("tar.gz", || Box::new(TarGzPackager::default()));
        registry.register("tgz", || Box::new(TarGzPackager::default()));
        registry
    }

    /// Register or replace a factory.
    pub fn register<F>(&mut self, identifier: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Packager> + Send + Sync + 'static,
    {
        self.factories.insert(identifier.into(), Box::new(factory));
    }

    pub fn create_packager_instance(&self, identifier: &str) -> Option<Box<dyn Packager>> {
        self.factories.get(identifier).map(|factory| factory())
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.factories.contains_key(identifier)
    }

    /// Registered identifiers, sorted.
    pub fn identifiers(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl fmt::Debug for PackagerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackagerRegistry")
            .field("identifiers", &self.identifiers())
            .finish()
    }
}

/// Read a file item completely. Source failures concern the item, not the
/// destination stream.
fn read_item(item: &SubmittableItem) -> Result<Vec<u8>, PackagerError> {
    let to_item_error = |err: io::Error| PackagerError::Item {
        path: item.filename().to_owned(),
        reason: err.to_string(),
    };

    let mut reader = item.open().map_err(to_item_error)?;
    let mut contents = Vec::new();
    reader.read_to_end(&mut contents).map_err(to_item_error)?;
    Ok(contents)
}

/// Entry name for `item` under an optional folder prefix.
///
/// Names that climb out of the archive root are an item error.
fn entry_name(prefix: Option<&str>, item: &SubmittableItem) -> Result<String, PackagerError> {
    let name = match prefix.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{prefix}/{}", item.filename()),
        None => item.filename().to_owned(),
    };

    if name.starts_with('/') || name.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(PackagerError::Item {
            path: item.filename().to_owned(),
            reason: format!("entry name '{name}' escapes the archive root"),
        });
    }
    Ok(name)
}
