//! File patcher collaborator and dependency-coordinate rewriting.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use regex::{Captures, Regex};
use tracing::debug;

pub trait FilePatcher {
    /// Rewrite `path` through `transform`. Returns whether the content changed.
    ///
    /// A missing file is left alone and reported as unchanged.
    fn apply_patch(&self, path: &Path, transform: &dyn Fn(&str) -> String) -> Result<bool>;
}

/// Patches files on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsPatcher;

impl FilePatcher for FsPatcher {
    fn apply_patch(&self, path: &Path, transform: &dyn Fn(&str) -> String) -> Result<bool> {
        let original = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "patch target missing");
                return Ok(false);
            }
            Err(err) => {
                return Err(err).with_context(|| format!("read {}", path.display()));
            }
        };
        let updated = transform(&original);
        if updated == original {
            return Ok(false);
        }
        fs::write(path, updated).with_context(|| format!("write {}", path.display()))?;
        debug!(path = %path.display(), "patched");
        Ok(true)
    }
}

/// A coordinate starts at line start or after a character that cannot be part of one.
const COORDINATE_START: &str = r"(?m)(?P<pre>^|[^A-Za-z0-9_.:\-])";
/// The version is the final segment: a trailing `:` means it was another
/// coordinate segment (`jar` in `group:artifact:jar:1.0`).
const VERSION: &str = r"(?P<version>[A-Za-z0-9_.+\-]+)(?P<more>:)?";

/// Compiled rewrite of `<from>:<version>` to `<to>:<target_version>`.
///
/// With `source_versions` empty every version is replaced, otherwise only the
/// listed ones are.
#[derive(Debug, Clone)]
pub struct CoordinateRewrite {
    re: Regex,
    source_versions: Vec<String>,
    to: String,
    target_version: String,
}

impl CoordinateRewrite {
    pub fn new(from: &str, source_versions: &[String], to: &str, target_version: &str) -> Result<Self> {
        let pattern = format!("{COORDINATE_START}{}:{VERSION}", regex::escape(from));
        let re = Regex::new(&pattern)
            .with_context(|| format!("compile coordinate pattern for {from}"))?;
        Ok(Self {
            re,
            source_versions: source_versions.to_vec(),
            to: to.to_string(),
            target_version: target_version.to_string(),
        })
    }

    /// Rewrite every version of `artifact` in place.
    pub fn version_bump(artifact: &str, source_versions: &[String], target_version: &str) -> Result<Self> {
        Self::new(artifact, source_versions, artifact, target_version)
    }

    pub fn apply(&self, content: &str) -> String {
        self.re
            .replace_all(content, |caps: &Captures<'_>| {
                let version = &caps["version"];
                if caps.name("more").is_some() {
                    return caps[0].to_string();
                }
                if self.source_versions.is_empty()
                    || self.source_versions.iter().any(|v| v == version)
                {
                    format!("{}{}:{}", &caps["pre"], self.to, self.target_version)
                } else {
                    caps[0].to_string()
                }
            })
            .into_owned()
    }
}

/// Group portion of a coordinate (`com.example:lib:jar` -> `com.example`).
pub fn coordinate_group(coordinate: &str) -> &str {
    coordinate.split(':').next().unwrap_or(coordinate)
}

/// Apply ordered regex substitutions to `content`.
pub fn apply_replacements(content: &str, replacements: &[(Regex, String)]) -> String {
    let mut current = content.to_string();
    for (re, replacement) in replacements {
        current = re.replace_all(&current, replacement.as_str()).into_owned();
    }
    current
}
