//! Resource filters
//!
//! Filters are attached to containers and decide which local children
//! appear in the namespace. Include-only filters narrow the visible set
//! (a child must match at least one of them), exclude-all filters then
//! subtract from it. Linked and virtual resources are never filtered.

use crate::tree::element::ElementTree;
use crate::tree::path::ResourcePath;
use bitflags::bitflags;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FilterType: u32 {
        const INCLUDE_ONLY = 1 << 0;
        const EXCLUDE_ALL = 1 << 1;
        /// Applies to files. With neither FILES nor FOLDERS it applies to both.
        const FILES = 1 << 2;
        const FOLDERS = 1 << 3;
        /// Also applies to every descendant container.
        const INHERITABLE = 1 << 4;
    }
}

/// Serializable matcher tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatcherDescription {
    /// Full match of the resource name against a regular expression.
    Regex(String),
    And(Vec<MatcherDescription>),
    Or(Vec<MatcherDescription>),
    Not(Box<MatcherDescription>),
}

#[derive(Debug)]
enum CompiledMatcher {
    Regex(Regex),
    And(Vec<CompiledMatcher>),
    Or(Vec<CompiledMatcher>),
    Not(Box<CompiledMatcher>),
}

impl CompiledMatcher {
    fn compile(description: &MatcherDescription) -> Result<Self, String> {
        Ok(match description {
            MatcherDescription::Regex(pattern) => {
                let anchored = format!("^(?:{})$", pattern);
                let regex = Regex::new(&anchored)
                    .map_err(|e| format!("invalid filter pattern '{}': {}", pattern, e))?;
                CompiledMatcher::Regex(regex)
            }
            MatcherDescription::And(parts) => CompiledMatcher::And(
                parts.iter().map(Self::compile).collect::<Result<_, _>>()?,
            ),
            MatcherDescription::Or(parts) => CompiledMatcher::Or(
                parts.iter().map(Self::compile).collect::<Result<_, _>>()?,
            ),
            MatcherDescription::Not(inner) => CompiledMatcher::Not(Box::new(Self::compile(inner)?)),
        })
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            CompiledMatcher::Regex(regex) => regex.is_match(name),
            CompiledMatcher::And(parts) => parts.iter().all(|m| m.matches(name)),
            CompiledMatcher::Or(parts) => parts.iter().any(|m| m.matches(name)),
            CompiledMatcher::Not(inner) => !inner.matches(name),
        }
    }
}

/// A filter attached to a container.
#[derive(Debug, Clone)]
pub struct FilterDescription {
    id: u64,
    filter_type: FilterType,
    matcher: MatcherDescription,
    compiled: Arc<CompiledMatcher>,
}

impl PartialEq for FilterDescription {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.filter_type == other.filter_type && self.matcher == other.matcher
    }
}

impl FilterDescription {
    /// Compile a filter. Fails on an invalid pattern or a type that is
    /// neither include-only nor exclude-all.
    pub fn new(id: u64, filter_type: FilterType, matcher: MatcherDescription) -> Result<Self, String> {
        let modes = filter_type & (FilterType::INCLUDE_ONLY | FilterType::EXCLUDE_ALL);
        if modes.bits().count_ones() != 1 {
            return Err("filter must be exactly one of include-only or exclude-all".to_string());
        }
        let compiled = CompiledMatcher::compile(&matcher)?;
        Ok(Self {
            id,
            filter_type,
            matcher,
            compiled: Arc::new(compiled),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn filter_type(&self) -> FilterType {
        self.filter_type
    }

    pub fn matcher(&self) -> &MatcherDescription {
        &self.matcher
    }

    pub fn is_include_only(&self) -> bool {
        self.filter_type.contains(FilterType::INCLUDE_ONLY)
    }

    pub fn is_inheritable(&self) -> bool {
        self.filter_type.contains(FilterType::INHERITABLE)
    }

    /// Whether this filter considers candidates of the given kind.
    pub fn applies_to(&self, is_folder: bool) -> bool {
        let files = self.filter_type.contains(FilterType::FILES);
        let folders = self.filter_type.contains(FilterType::FOLDERS);
        if !files && !folders {
            return true;
        }
        if is_folder {
            folders
        } else {
            files
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        self.compiled.matches(name)
    }
}

impl fmt::Display for FilterDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.is_include_only() { "include" } else { "exclude" };
        write!(f, "#{} {} {:?}", self.id, mode, self.matcher)
    }
}

/// Filters that apply to the children of one container.
#[derive(Debug, Default)]
pub struct FilterSet {
    includes: Vec<FilterDescription>,
    excludes: Vec<FilterDescription>,
}

impl FilterSet {
    /// The container's own filters plus inheritable filters of its ancestors.
    pub fn for_container(tree: &ElementTree, container: &ResourcePath) -> FilterSet {
        let mut set = FilterSet::default();
        for depth in 1..=container.segment_count() {
            let ancestor = container.prefix(depth);
            let own = depth == container.segment_count();
            if let Some(info) = tree.info(&ancestor) {
                for filter in &info.filters {
                    if own || filter.is_inheritable() {
                        set.push(filter.clone());
                    }
                }
            }
        }
        set
    }

    pub fn from_filters(filters: impl IntoIterator<Item = FilterDescription>) -> FilterSet {
        let mut set = FilterSet::default();
        for filter in filters {
            set.push(filter);
        }
        set
    }

    fn push(&mut self, filter: FilterDescription) {
        if filter.is_include_only() {
            self.includes.push(filter);
        } else {
            self.excludes.push(filter);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.includes.is_empty() && self.excludes.is_empty()
    }

    /// Whether a local child with this name is part of the namespace.
    pub fn is_visible(&self, name: &str, is_folder: bool) -> bool {
        let mut includes = self.includes.iter().filter(|f| f.applies_to(is_folder)).peekable();
        if includes.peek().is_some() && !includes.any(|f| f.matches(name)) {
            return false;
        }
        !self
            .excludes
            .iter()
            .any(|f| f.applies_to(is_folder) && f.matches(name))
    }
}
