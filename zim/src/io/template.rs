//! Rendering of shell-command templates.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use minijinja::{Environment, UndefinedBehavior, context};
use serde::Serialize;

/// Application values visible to templates as `app.*`.
#[derive(Debug, Clone, Serialize)]
pub struct AppVars {
    pub key: String,
    pub name: String,
    pub git_url: Option<String>,
    pub tags: BTreeSet<String>,
    pub directory: String,
}

/// Source tree values visible to templates as `source_tree.*`.
#[derive(Debug, Clone, Serialize)]
pub struct SourceTreeVars {
    pub key: String,
    pub directory: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateVars {
    pub app: AppVars,
    pub source_tree: SourceTreeVars,
    pub base_directory: String,
    pub workdir: String,
}

/// Render a single template string. Unknown variables are an error.
pub fn render(source: &str, vars: &TemplateVars) -> Result<String> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.add_template("command", source)
        .with_context(|| format!("parse command template `{source}`"))?;
    let rendered = env
        .get_template("command")?
        .render(context! {
            app => &vars.app,
            source_tree => &vars.source_tree,
            base_directory => &vars.base_directory,
            workdir => &vars.workdir,
        })
        .with_context(|| format!("render command template `{source}`"))?;
    Ok(rendered)
}
