//! Assignment targets and the catalog file that defines them.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::domain::model::SubmittableItem;
use crate::domain::rules::{
    AmbiguityResolutionPolicy, PatternError, RuleLevel, evaluate_exclusion, is_required,
};

/// An assignment a student can submit to, together with the rules inherited
/// from every group above it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentTarget {
    name: String,
    groups: Vec<String>,
    transport: String,
    packager: String,
    packager_params: BTreeMap<String, String>,
    levels: Vec<RuleLevel>,
    ambiguity: AmbiguityResolutionPolicy,
}

impl AssignmentTarget {
    pub fn new(
        name: impl Into<String>,
        transport: impl Into<String>,
        packager: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            groups: Vec::new(),
            transport: transport.into(),
            packager: packager.into(),
            packager_params: BTreeMap::new(),
            levels: Vec::new(),
            ambiguity: AmbiguityResolutionPolicy::default(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.packager_params.insert(key.into(), value.into());
        self
    }

    /// Append a rule level below the existing ones.
    pub fn with_level(mut self, level: RuleLevel) -> Self {
        self.levels.push(level);
        self
    }

    pub fn with_ambiguity(mut self, policy: AmbiguityResolutionPolicy) -> Self {
        self.ambiguity = policy;
        self
    }

    pub fn with_groups(mut self, groups: Vec<String>) -> Self {
        self.groups = groups;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Group names joined with the assignment name, e.g. `CS 1114/Lab 1`.
    pub fn qualified_name(&self) -> String {
        let mut parts: Vec<&str> = self.groups.iter().map(String::as_str).collect();
        parts.push(&self.name);
        parts.join("/")
    }

    pub fn transport(&self) -> &str {
        &self.transport
    }

    pub fn packager(&self) -> &str {
        &self.packager
    }

    pub fn packager_params(&self) -> &BTreeMap<String, String> {
        &self.packager_params
    }

    pub fn levels(&self) -> &[RuleLevel] {
        &self.levels
    }

    pub fn ambiguity(&self) -> AmbiguityResolutionPolicy {
        self.ambiguity
    }

    pub fn is_file_excluded(&self, path: &str) -> bool {
        evaluate_exclusion(&self.levels, path, self.ambiguity)
    }

    pub fn is_file_required(&self, path: &str) -> bool {
        is_required(&self.levels, path)
    }

    /// Required patterns that no submitted, non-excluded file satisfies.
    pub fn missing_required_files(&self, items: &[SubmittableItem]) -> Vec<String> {
        let mut accepted = Vec::new();
        collect_accepted(items, self, &mut accepted);

        self.levels
            .iter()
            .flat_map(|level| level.required.iter())
            .filter(|pattern| !accepted.iter().any(|path| pattern.matches(path)))
            .map(|pattern| pattern.as_str().to_owned())
            .collect()
    }
}

fn collect_accepted<'a>(
    items: &'a [SubmittableItem],
    target: &AssignmentTarget,
    out: &mut Vec<&'a str>,
) {
    for item in items {
        if item.is_folder() {
            collect_accepted(item.children(), target, out);
        } else if !target.is_file_excluded(item.filename()) {
            out.push(item.filename());
        }
    }
}

/// Errors raised while loading or querying a [`TargetCatalog`].
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read target definitions from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse target definitions: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid rules for '{node}': {source}")]
    Pattern {
        node: String,
        #[source]
        source: PatternError,
    },
    #[error("assignment '{assignment}' has no {attribute} (set it on the assignment or a group)")]
    MissingAttribute {
        assignment: String,
        attribute: &'static str,
    },
    #[error("no assignment named '{0}'")]
    UnknownAssignment(String),
    #[error("'{name}' is ambiguous; use one of: {}", .candidates.join(", "))]
    AmbiguousAssignment {
        name: String,
        candidates: Vec<String>,
    },
}

/// One node of the definition file. Groups and assignments share a shape;
/// attributes flow down to nested nodes unless overridden.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct TargetNode {
    name: Option<String>,
    transport: Option<String>,
    packager: Option<String>,
    #[serde(default)]
    packager_params: BTreeMap<String, String>,
    ambiguity: Option<AmbiguityResolutionPolicy>,
    #[serde(default)]
    include: Vec<String>,
    #[serde(default)]
    exclude: Vec<String>,
    #[serde(default)]
    required: Vec<String>,
    #[serde(default)]
    hidden: bool,
    #[serde(default)]
    group: Vec<TargetNode>,
    #[serde(default)]
    assignment: Vec<TargetNode>,
}

#[derive(Debug, Clone, Default)]
struct Inherited {
    groups: Vec<String>,
    transport: Option<String>,
    packager: Option<String>,
    params: BTreeMap<String, String>,
    ambiguity: Option<AmbiguityResolutionPolicy>,
    levels: Vec<RuleLevel>,
    hidden: bool,
}

impl Inherited {
    fn descend(&self, node: &TargetNode, label: &str) -> Result<Self, CatalogError> {
        let level = RuleLevel::from_patterns(&node.include, &node.exclude, &node.required)
            .map_err(|source| CatalogError::Pattern {
                node: label.to_owned(),
                source,
            })?;

        let mut next = self.clone();
        if node.transport.is_some() {
            next.transport = node.transport.clone();
        }
        if node.packager.is_some() {
            next.packager = node.packager.clone();
        }
        next.params
            .extend(node.packager_params.iter().map(|(k, v)| (k.clone(), v.clone())));
        if node.ambiguity.is_some() {
            next.ambiguity = node.ambiguity;
        }
        next.levels.push(level);
        next.hidden |= node.hidden;
        Ok(next)
    }
}

/// A catalog entry: the resolved target plus listing metadata.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub target: AssignmentTarget,
    pub hidden: bool,
}

/// All assignments declared in a target definition file.
#[derive(Debug, Clone, Default)]
pub struct TargetCatalog {
    entries: Vec<CatalogEntry>,
}

impl TargetCatalog {
    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let data = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&data)
    }

    pub fn from_toml(contents: &str) -> Result<Self, CatalogError> {
        let root: TargetNode = toml::from_str(contents)?;
        let mut entries = Vec::new();
        let inherited = Inherited::default().descend(&root, "<root>")?;
        flatten(&root, &inherited, &mut entries)?;
        Ok(Self { entries })
    }

    /// Visible assignments in declaration order.
    pub fn assignments(&self) -> impl Iterator<Item = &AssignmentTarget> {
        self.entries
            .iter()
            .filter(|entry| !entry.hidden)
            .map(|entry| &entry.target)
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Look up an assignment by qualified name, or by bare name when unique.
    pub fn find(&self, name: &str) -> Result<&AssignmentTarget, CatalogError> {
        let wanted = name.trim().trim_matches('/');
        if let Some(entry) = self
            .entries
            .iter()
            .find(|entry| entry.target.qualified_name() == wanted)
        {
            return Ok(&entry.target);
        }

        let matches: Vec<&AssignmentTarget> = self
            .entries
            .iter()
            .map(|entry| &entry.target)
            .filter(|target| target.name() == wanted)
            .collect();

        match matches.as_slice() {
            [] => Err(CatalogError::UnknownAssignment(wanted.to_owned())),
            [single] => Ok(single),
            many => Err(CatalogError::AmbiguousAssignment {
                name: wanted.to_owned(),
                candidates: many.iter().map(|t| t.qualified_name()).collect(),
            }),
        }
    }
}

fn flatten(
    node: &TargetNode,
    inherited: &Inherited,
    entries: &mut Vec<CatalogEntry>,
) -> Result<(), CatalogError> {
    for assignment in &node.assignment {
        let name = assignment.name.clone().unwrap_or_default();
        let resolved = inherited.descend(assignment, &name)?;
        let transport = resolved
            .transport
            .clone()
            .ok_or_else(|| CatalogError::MissingAttribute {
                assignment: name.clone(),
                attribute: "transport",
            })?;
        let packager = resolved
            .packager
            .clone()
            .ok_or_else(|| CatalogError::MissingAttribute {
                assignment: name.clone(),
                attribute: "packager",
            })?;

        let mut target = AssignmentTarget::new(name, transport, packager)
            .with_groups(resolved.groups.clone())
            .with_ambiguity(resolved.ambiguity.unwrap_or_default());
        target.packager_params = resolved.params;
        target.levels = resolved.levels;
        entries.push(CatalogEntry {
            target,
            hidden: resolved.hidden,
        });
    }

    for group in &node.group {
        let name = group.name.clone().unwrap_or_default();
        let mut resolved = inherited.descend(group, &name)?;
        resolved.groups.push(name);
        flatten(group, &resolved, entries)?;
    }

    Ok(())
}
