//! Export of the current environment as a browser-loadable script.
//!
//! The file holds a single statement, `var zepher = JSON.parse('<json>');`,
//! and is fully rewritten after every processed response.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::api::ApiError;
use crate::models::Environment;

pub struct EnvExporter {
    path: PathBuf,
}

impl EnvExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the export file with the given environment.
    pub fn write(&self, env: &Environment) -> Result<(), ApiError> {
        let contents = render_script(env);
        std::fs::write(&self.path, contents).map_err(|source| ApiError::Export {
            path: self.path.display().to_string(),
            source,
        })?;
        debug!(path = %self.path.display(), "Environment exported");
        Ok(())
    }
}

/// Render the assignment statement for `env`.
pub fn render_script(env: &Environment) -> String {
    let json = serde_json::Value::Object(env.as_map().clone()).to_string();
    format!("var zepher = JSON.parse('{}');", escape_single_quoted(&json))
}

/// Escape text for a JavaScript single-quoted string literal.
fn escape_single_quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            _ => out.push(c),
        }
    }
    out
}
