use crate::model::DetailMap;
use anyhow::{Context, Result};
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ExportFormat {
    Json,
    Yaml,
}

impl ExportFormat {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
        }
    }

    pub fn render(self, detail: &DetailMap) -> Result<String> {
        match self {
            Self::Json => serde_json::to_string_pretty(detail).context("failed to encode JSON"),
            Self::Yaml => serde_yaml::to_string(detail).context("failed to encode YAML"),
        }
    }
}

/// Writes `detail` to `<dir>/<type>-<id>-<timestamp>.<ext>` and returns the
/// path. Characters that are unsafe in file names are replaced with `_`.
pub fn write_export(
    dir: &Path,
    resource_type: &str,
    resource_id: &str,
    detail: &DetailMap,
    format: ExportFormat,
) -> Result<PathBuf> {
    let stamp = Local::now().format("%Y%m%d-%H%M%S");
    let file_name = format!(
        "{}-{}-{stamp}.{}",
        sanitize(resource_type),
        sanitize(resource_id),
        format.extension()
    );
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create export dir {}", dir.display()))?;
    let path = dir.join(file_name);
    let body = format.render(detail)?;
    fs::write(&path, body).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

fn sanitize(raw: &str) -> String {
    let cleaned = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect::<String>();
    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        "resource".to_string()
    } else {
        trimmed.chars().take(96).collect()
    }
}
