//! Building the submittable item forest from paths on disk.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use ignore::WalkBuilder;

use crate::domain::model::SubmittableItem;
use crate::infra::config::Config;

/// Per-directory ignore file understood in addition to `.gitignore`.
pub const SUBMIT_IGNORE: &str = ".submitignore";

/// Walker settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScannerConfig {
    pub show_hidden: bool,
    pub respect_ignore_files: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            show_hidden: false,
            respect_ignore_files: true,
        }
    }
}

impl ScannerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            show_hidden: config.defaults.show_hidden,
            ..Self::default()
        }
    }

    pub fn with_show_hidden(mut self, show_hidden: bool) -> Self {
        self.show_hidden = show_hidden;
        self
    }

    pub fn with_ignore_files(mut self, respect: bool) -> Self {
        self.respect_ignore_files = respect;
        self
    }
}

/// Turns command-line roots into a [`SubmittableItem`] forest.
///
/// A file root becomes a single item named after the file. A directory root
/// contributes its contents, named relative to the directory, so submitting
/// `lab1/` packages `src/Main.java` rather than `lab1/src/Main.java`.
/// Children are ordered by file name.
#[derive(Debug, Default)]
pub struct ItemScanner {
    config: ScannerConfig,
}

impl ItemScanner {
    pub fn new(config: ScannerConfig) -> Self {
        Self { config }
    }

    pub fn scan(&self, roots: &[PathBuf]) -> Result<Vec<SubmittableItem>> {
        let mut forest = Vec::new();
        for root in roots {
            let metadata = root
                .metadata()
                .with_context(|| format!("cannot read {}", root.display()))?;
            if metadata.is_dir() {
                forest.extend(self.scan_dir(root));
            } else if metadata.is_file() {
                let Some(name) = root.file_name().and_then(|name| name.to_str()) else {
                    bail!("{} has no usable file name", root.display());
                };
                forest.push(SubmittableItem::file(name, root));
            } else {
                bail!("{} is neither a file nor a directory", root.display());
            }
        }
        Ok(forest)
    }

    fn scan_dir(&self, root: &Path) -> Vec<SubmittableItem> {
        let respect = self.config.respect_ignore_files;
        let mut builder = WalkBuilder::new(root);
        builder
            .hidden(!self.config.show_hidden)
            .git_ignore(respect)
            .git_exclude(respect)
            .git_global(respect)
            .ignore(respect)
            .parents(respect)
            .require_git(false)
            .sort_by_file_name(|a, b| a.cmp(b));
        if respect {
            builder.add_custom_ignore_filename(SUBMIT_IGNORE);
        }

        // Open folders with their walk depth; the walk is depth-first so a
        // folder is complete once an entry at the same or a shallower depth
        // arrives.
        let mut open: Vec<(usize, SubmittableItem)> = Vec::new();
        let mut forest = Vec::new();

        for result in builder.build() {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(error = %err, "scanner error");
                    continue;
                }
            };
            let depth = entry.depth();
            if depth == 0 {
                continue;
            }
            close_folders(&mut open, &mut forest, depth);

            let Some(file_type) = entry.file_type() else {
                continue;
            };
            let name = relative_name(root, entry.path());
            if file_type.is_dir() {
                open.push((depth, SubmittableItem::folder(name)));
            } else if file_type.is_file() {
                attach(
                    &mut open,
                    &mut forest,
                    SubmittableItem::file(name, entry.path()),
                );
            } else {
                tracing::debug!(path = %entry.path().display(), "skipping special file");
            }
        }
        close_folders(&mut open, &mut forest, 1);
        forest
    }
}

fn close_folders(
    open: &mut Vec<(usize, SubmittableItem)>,
    forest: &mut Vec<SubmittableItem>,
    depth: usize,
) {
    while open.last().is_some_and(|(open_depth, _)| *open_depth >= depth) {
        if let Some((_, folder)) = open.pop() {
            attach(open, forest, folder);
        }
    }
}

fn attach(
    open: &mut [(usize, SubmittableItem)],
    forest: &mut Vec<SubmittableItem>,
    item: SubmittableItem,
) {
    match open.last_mut() {
        Some((_, parent)) => parent.push_child(item),
        None => forest.push(item),
    }
}

fn relative_name(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|part| part.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
