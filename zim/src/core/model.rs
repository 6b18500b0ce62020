//! Declarative registry model: repository -> source trees -> applications.
//!
//! The model is purely additive. Keys are unique within their owner and a
//! duplicate registration fails immediately with a definition error.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::ZimError;

/// Typed settings accepted when defining a source tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceTreeOptions {
    /// Directory name under the base directory. Defaults to the tree key.
    pub directory: Option<String>,
    /// Prefix used to derive remote URLs for applications without one.
    pub base_git_url: Option<String>,
}

/// Typed settings accepted when defining an application.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationOptions {
    /// Explicit remote location; may be a bare name or a full URL.
    pub git_url: Option<String>,
    pub tags: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Application {
    key: String,
    git_url: Option<String>,
    tags: BTreeSet<String>,
}

impl Application {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Last path component of the key; names the on-disk checkout.
    pub fn name(&self) -> &str {
        application_name(&self.key)
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Remote location for this application within `tree`.
    ///
    /// Uses the explicit `git_url` or the key. A value without a `:` is
    /// treated as a repository name under the tree's `base_git_url`.
    pub fn remote_url(&self, tree: &SourceTree) -> Option<String> {
        let url = self.git_url.as_deref().unwrap_or(&self.key);
        if url.contains(':') {
            return Some(url.to_string());
        }
        tree.base_git_url()
            .map(|base| format!("{}/{}.git", base.trim_end_matches('/'), url))
    }
}

/// Basename of an application key (`org/app` -> `app`).
pub fn application_name(key: &str) -> &str {
    Path::new(key)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(key)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTree {
    key: String,
    directory: Option<String>,
    base_git_url: Option<String>,
    applications: Vec<Application>,
}

impl SourceTree {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn directory(&self) -> &str {
        self.directory.as_deref().unwrap_or(&self.key)
    }

    pub fn base_git_url(&self) -> Option<&str> {
        self.base_git_url.as_deref()
    }

    /// Register an application. Fails if the key is already taken in this tree.
    pub fn define_application(
        &mut self,
        key: &str,
        options: ApplicationOptions,
    ) -> Result<&Application, ZimError> {
        if key.trim().is_empty() {
            return Err(ZimError::InvalidDefinition {
                what: format!("application in source tree '{}'", self.key),
                reason: "key must be non-empty".to_string(),
            });
        }
        if self.application_exists(key) {
            return Err(ZimError::DuplicateApplication {
                tree: self.key.clone(),
                key: key.to_string(),
            });
        }
        self.applications.push(Application {
            key: key.to_string(),
            git_url: options.git_url,
            tags: options.tags,
        });
        let index = self.applications.len() - 1;
        Ok(&self.applications[index])
    }

    pub fn application(&self, key: &str) -> Result<&Application, ZimError> {
        self.applications
            .iter()
            .find(|app| app.key == key)
            .ok_or_else(|| ZimError::ApplicationNotFound {
                tree: self.key.clone(),
                key: key.to_string(),
            })
    }

    pub fn application_exists(&self, key: &str) -> bool {
        self.applications.iter().any(|app| app.key == key)
    }

    /// Applications in definition order; this is the driver's iteration order.
    pub fn applications(&self) -> &[Application] {
        &self.applications
    }
}

/// Root of the registry. Owns every source tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Repository {
    source_trees: BTreeMap<String, SourceTree>,
}

impl Repository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source tree. Fails if the key is already registered.
    pub fn define_source_tree(
        &mut self,
        key: &str,
        options: SourceTreeOptions,
    ) -> Result<&mut SourceTree, ZimError> {
        if key.trim().is_empty() {
            return Err(ZimError::InvalidDefinition {
                what: "source tree".to_string(),
                reason: "key must be non-empty".to_string(),
            });
        }
        if self.source_tree_exists(key) {
            return Err(ZimError::DuplicateSourceTree {
                key: key.to_string(),
            });
        }
        let tree = SourceTree {
            key: key.to_string(),
            directory: options.directory,
            base_git_url: options.base_git_url,
            applications: Vec::new(),
        };
        Ok(self.source_trees.entry(key.to_string()).or_insert(tree))
    }

    /// Register an application inside an existing source tree.
    pub fn define_application(
        &mut self,
        tree_key: &str,
        key: &str,
        options: ApplicationOptions,
    ) -> Result<&Application, ZimError> {
        let available = self.source_tree_keys();
        let tree = self
            .source_trees
            .get_mut(tree_key)
            .ok_or_else(|| ZimError::SourceTreeNotFound {
                key: tree_key.to_string(),
                available,
            })?;
        tree.define_application(key, options)
    }

    pub fn source_tree(&self, key: &str) -> Result<&SourceTree, ZimError> {
        self.source_trees
            .get(key)
            .ok_or_else(|| ZimError::SourceTreeNotFound {
                key: key.to_string(),
                available: self.source_tree_keys(),
            })
    }

    pub fn source_tree_exists(&self, key: &str) -> bool {
        self.source_trees.contains_key(key)
    }

    /// Source trees sorted by key.
    pub fn source_trees(&self) -> impl Iterator<Item = &SourceTree> {
        self.source_trees.values()
    }

    pub fn source_tree_keys(&self) -> Vec<String> {
        self.source_trees.keys().cloned().collect()
    }
}
