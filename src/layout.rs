// src/layout.rs

use serde::{Deserialize, Serialize};

/// Directory-prefix scheme a history uses for parallel lines of development.
///
/// `root_keywords` are single-segment prefixes (`/trunk/...`), `named_keywords`
/// are followed by a name segment (`/branches/<name>/...`, `/tags/<name>/...`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutConvention {
    pub root_keywords: Vec<String>,
    pub named_keywords: Vec<String>,
}

impl Default for LayoutConvention {
    fn default() -> Self {
        Self {
            root_keywords: vec!["trunk".into()],
            named_keywords: vec!["branches".into(), "tags".into()],
        }
    }
}

/// Maps source-layout paths onto the flat layout of the target history.
#[derive(Debug, Clone, Default)]
pub struct PathTranslator {
    convention: LayoutConvention,
}

impl PathTranslator {
    pub fn new(convention: LayoutConvention) -> Self {
        Self { convention }
    }

    pub fn convention(&self) -> &LayoutConvention {
        &self.convention
    }

    /// Strips the layout prefix from `path`.
    ///
    /// Paths are `/`-rooted, so `parts[0]` is always empty and `parts[1]` is
    /// the first real segment.
    pub fn translate(&self, path: &str) -> String {
        let parts: Vec<&str> = path.split('/').collect();
        let start = match parts.get(1) {
            Some(segment) if self.is_root(segment) => 2,
            Some(segment) if self.is_named(segment) && parts.len() > 2 => 3,
            _ => 1,
        };
        format!("/{}", parts.get(start..).unwrap_or_default().join("/"))
    }

    /// Layout prefix a branch URL ends in: `/trunk` for `.../trunk`,
    /// `/branches/rel1` for `.../branches/rel1`.
    pub fn branch_root(&self, location: &str) -> Option<String> {
        let parts: Vec<&str> = location.trim_end_matches('/').split('/').collect();
        match parts.as_slice() {
            [.., keyword, name] if self.is_named(keyword) && !name.is_empty() => {
                Some(format!("/{keyword}/{name}"))
            }
            [.., root] if self.is_root(root) => Some(format!("/{root}")),
            _ => None,
        }
    }

    fn is_root(&self, segment: &str) -> bool {
        self.convention.root_keywords.iter().any(|k| k == segment)
    }

    fn is_named(&self, segment: &str) -> bool {
        self.convention.named_keywords.iter().any(|k| k == segment)
    }
}
