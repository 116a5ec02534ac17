//! Project descriptions
//!
//! A project's persisted configuration: comment, references, natures,
//! charsets, links, virtual folders and filters. Stored as TOML in the project's
//! description file and re-read when the project is opened.

use crate::error::ResourceError;
use crate::filter::{FilterDescription, FilterType, MatcherDescription};
use crate::tree::path::{validate_segment, ResourcePath};
use crate::types::ResourceKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

/// File name of the description inside every project.
pub const DESCRIPTION_FILE: &str = ".project";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkDescription {
    /// Project-relative path of the link.
    pub path: String,
    pub kind: LinkKind,
    /// Target location; absent for virtual folders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    File,
    Folder,
}

impl LinkKind {
    pub fn resource_kind(self) -> ResourceKind {
        match self {
            LinkKind::File => ResourceKind::File,
            LinkKind::Folder => ResourceKind::Folder,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterEntry {
    /// Project-relative path of the filtered container; empty for the project.
    pub path: String,
    pub id: u64,
    pub filter_type: u32,
    pub matcher: MatcherDescription,
}

impl FilterEntry {
    pub fn from_filter(path: String, filter: &FilterDescription) -> Self {
        Self {
            path,
            id: filter.id(),
            filter_type: filter.filter_type().bits(),
            matcher: filter.matcher().clone(),
        }
    }

    pub fn to_filter(&self) -> Result<FilterDescription, String> {
        let filter_type = FilterType::from_bits(self.filter_type)
            .ok_or_else(|| format!("unknown filter type bits {:#x}", self.filter_type))?;
        FilterDescription::new(self.id, filter_type, self.matcher.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProjectDescription {
    pub name: String,
    #[serde(default)]
    pub comment: String,
    /// Non-default project location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<PathBuf>,
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default)]
    pub natures: Vec<String>,
    /// Explicit charsets by project-relative path; the empty key is the
    /// project default.
    #[serde(default)]
    pub encodings: BTreeMap<String, String>,
    #[serde(default)]
    pub links: Vec<LinkDescription>,
    #[serde(default)]
    pub filters: Vec<FilterEntry>,
}

impl ProjectDescription {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn to_toml(&self) -> Result<String, ResourceError> {
        toml::to_string_pretty(self).map_err(|e| ResourceError::InvalidValue {
            path: ResourcePath::root(),
            reason: format!("cannot serialize description of '{}': {}", self.name, e),
        })
    }

    pub fn from_toml(project: &ResourcePath, content: &str) -> Result<Self, ResourceError> {
        toml::from_str(content).map_err(|e| ResourceError::invalid(project, format!("malformed project description: {}", e)))
    }

    /// Structural checks that do not depend on registered natures.
    pub fn validate(&self, project: &ResourcePath) -> Result<(), ResourceError> {
        validate_segment(&self.name).map_err(|reason| ResourceError::invalid(project, reason))?;
        let mut seen = HashSet::new();
        for reference in &self.references {
            if reference == &self.name {
                return Err(ResourceError::invalid(project, "project references itself"));
            }
            if !seen.insert(reference) {
                return Err(ResourceError::invalid(
                    project,
                    format!("duplicate project reference '{}'", reference),
                ));
            }
        }
        let mut link_paths = HashSet::new();
        for link in &self.links {
            if !link_paths.insert(&link.path) {
                return Err(ResourceError::invalid(
                    project,
                    format!("duplicate link '{}'", link.path),
                ));
            }
            if link.location.is_none() && link.kind == LinkKind::File {
                return Err(ResourceError::invalid(
                    project,
                    format!("linked file '{}' has no location", link.path),
                ));
            }
        }
        for entry in &self.filters {
            entry
                .to_filter()
                .map_err(|reason| ResourceError::invalid(project, reason))?;
        }
        Ok(())
    }
}

/// Known project natures and their prerequisites.
#[derive(Debug, Clone, Default)]
pub struct NatureRegistry {
    requires: HashMap<String, Vec<String>>,
}

impl NatureRegistry {
    pub fn register(&mut self, nature: &str, requires: &[&str]) {
        self.requires.insert(
            nature.to_string(),
            requires.iter().map(|s| s.to_string()).collect(),
        );
    }

    /// Check a nature set: every prerequisite present and no cycles.
    ///
    /// Unknown natures are accepted as-is.
    pub fn validate(&self, project: &ResourcePath, natures: &[String]) -> Result<(), ResourceError> {
        let present: HashSet<&str> = natures.iter().map(String::as_str).collect();
        for nature in natures {
            if let Some(required) = self.requires.get(nature) {
                for prerequisite in required {
                    if !present.contains(prerequisite.as_str()) {
                        return Err(ResourceError::invalid(
                            project,
                            format!("nature '{}' requires '{}'", nature, prerequisite),
                        ));
                    }
                }
            }
            self.check_cycle(project, nature, &mut Vec::new())?;
        }
        Ok(())
    }

    fn check_cycle<'a>(
        &'a self,
        project: &ResourcePath,
        nature: &'a str,
        stack: &mut Vec<&'a str>,
    ) -> Result<(), ResourceError> {
        if stack.contains(&nature) {
            return Err(ResourceError::invalid(
                project,
                format!("nature prerequisite cycle through '{}'", nature),
            ));
        }
        stack.push(nature);
        if let Some(required) = self.requires.get(nature) {
            for prerequisite in required {
                self.check_cycle(project, prerequisite, stack)?;
            }
        }
        stack.pop();
        Ok(())
    }
}
