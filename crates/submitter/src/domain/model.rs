//! Domain models for submittable files and folders.

use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::PathBuf;

/// Distinguishes a file node from a folder node in the item forest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubmittableItemKind {
    /// A folder that contains other items.
    Folder,
    /// A file whose contents can be packaged.
    File,
}

/// Where the bytes of a file item come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemSource {
    Disk(PathBuf),
    Memory(Vec<u8>),
    None,
}

/// A candidate for inclusion in a submission.
///
/// `filename` is the forest-relative path using `/` separators; it is what
/// the assignment's rules are evaluated against and what packagers use as the
/// entry name. Folders exclusively own their children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittableItem {
    kind: SubmittableItemKind,
    filename: String,
    source: ItemSource,
    children: Vec<SubmittableItem>,
}

impl SubmittableItem {
    /// A file backed by a path on disk.
    pub fn file(filename: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            kind: SubmittableItemKind::File,
            filename: normalize_filename(filename.into()),
            source: ItemSource::Disk(path.into()),
            children: Vec::new(),
        }
    }

    /// A file whose contents are held in memory.
    pub fn in_memory(filename: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: SubmittableItemKind::File,
            filename: normalize_filename(filename.into()),
            source: ItemSource::Memory(contents.into()),
            children: Vec::new(),
        }
    }

    /// An empty folder; populate it with [`SubmittableItem::with_child`].
    pub fn folder(filename: impl Into<String>) -> Self {
        Self {
            kind: SubmittableItemKind::Folder,
            filename: normalize_filename(filename.into()),
            source: ItemSource::None,
            children: Vec::new(),
        }
    }

    /// Builder-style helper appending a child. Only meaningful for folders.
    pub fn with_child(mut self, child: SubmittableItem) -> Self {
        self.children.push(child);
        self
    }

    pub fn push_child(&mut self, child: SubmittableItem) {
        self.children.push(child);
    }

    pub fn kind(&self) -> SubmittableItemKind {
        self.kind
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn source(&self) -> &ItemSource {
        &self.source
    }

    pub fn children(&self) -> &[SubmittableItem] {
        &self.children
    }

    pub fn is_file(&self) -> bool {
        self.kind == SubmittableItemKind::File
    }

    pub fn is_folder(&self) -> bool {
        self.kind == SubmittableItemKind::Folder
    }

    /// Number of file nodes in this subtree, including `self`.
    pub fn leaf_count(&self) -> usize {
        match self.kind {
            SubmittableItemKind::File => 1,
            SubmittableItemKind::Folder => self.children.iter().map(Self::leaf_count).sum(),
        }
    }

    /// Open a reader over the file's contents.
    pub fn open(&self) -> io::Result<Box<dyn Read + '_>> {
        match (&self.kind, &self.source) {
            (SubmittableItemKind::File, ItemSource::Disk(path)) => {
                Ok(Box::new(File::open(path)?))
            }
            (SubmittableItemKind::File, ItemSource::Memory(bytes)) => {
                Ok(Box::new(Cursor::new(bytes.as_slice())))
            }
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("'{}' has no readable contents", self.filename),
            )),
        }
    }
}

/// Total number of file nodes across a forest.
pub fn forest_leaf_count(items: &[SubmittableItem]) -> usize {
    items.iter().map(SubmittableItem::leaf_count).sum()
}

fn normalize_filename(raw: String) -> String {
    let replaced = raw.replace('\\', "/");
    let trimmed = replaced.trim_start_matches("./").trim_matches('/');
    trimmed.to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_count_ignores_folders() {
        let tree = SubmittableItem::folder("src")
            .with_child(SubmittableItem::in_memory("src/a.rs", "a"))
            .with_child(
                SubmittableItem::folder("src/nested")
                    .with_child(SubmittableItem::in_memory("src/nested/b.rs", "b")),
            )
            .with_child(SubmittableItem::folder("src/empty"));

        assert_eq!(tree.leaf_count(), 2);
        assert_eq!(forest_leaf_count(&[tree.clone(), tree]), 4);
    }

    #[test]
    fn filenames_are_normalized() {
        let item = SubmittableItem::in_memory(".\\src\\main.rs", "");
        assert_eq!(item.filename(), "src/main.rs");

        let folder = SubmittableItem::folder("/build/");
        assert_eq!(folder.filename(), "build");
    }

    #[test]
    fn open_reads_memory_contents_and_rejects_folders() {
        let item = SubmittableItem::in_memory("notes.txt", "hello");
        let mut contents = String::new();
        item.open().unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "hello");

        let folder = SubmittableItem::folder("docs");
        assert!(folder.open().is_err());
    }
}
