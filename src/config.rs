use crate::model::{DEFAULT_PAGE_SIZE, Scope};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const MAX_PAGE_SIZE: usize = 1_000;
const FALLBACK_REGION: &str = "us-east-1";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StratusConfig {
    pub default_profile: Option<String>,
    pub default_region: Option<String>,
    pub page_size: usize,
    pub aws_binary: String,
    #[serde(alias = "timeout", alias = "timeout_secs")]
    pub call_timeout_secs: u64,
    pub aliases: BTreeMap<String, String>,
    pub export_dir: PathBuf,
    pub bookmarks_file: Option<PathBuf>,
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Default for StratusConfig {
    fn default() -> Self {
        Self {
            default_profile: None,
            default_region: None,
            page_size: DEFAULT_PAGE_SIZE,
            aws_binary: "aws".to_string(),
            call_timeout_secs: 20,
            aliases: BTreeMap::new(),
            export_dir: PathBuf::from("."),
            bookmarks_file: None,
            source: None,
        }
    }
}

impl StratusConfig {
    /// Loads `explicit` when given, otherwise the first discovered file.
    /// No file at all yields the defaults; a file that fails to parse is an
    /// error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => discover_config_path(),
        };
        match path {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let mut parsed: StratusConfig = if raw.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(&raw)
                .with_context(|| format!("failed to parse config {}", path.display()))?
        };
        parsed.source = Some(path.to_path_buf());
        Ok(parsed)
    }

    pub fn page_size(&self) -> usize {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs.max(1))
    }

    /// `bookmarks_file` when set, otherwise next to the user config.
    pub fn bookmarks_path(&self) -> PathBuf {
        if let Some(path) = &self.bookmarks_file {
            return path.clone();
        }
        match non_empty_env("HOME") {
            Some(home) => PathBuf::from(home).join(".config/stratus/bookmarks.yaml"),
            None => PathBuf::from(".stratus-bookmarks.yaml"),
        }
    }

    /// Starting scope. Explicit values win over the file, the file over the
    /// standard AWS environment variables.
    pub fn initial_scope(&self, profile: Option<String>, region: Option<String>) -> Scope {
        let profile = profile
            .or_else(|| self.default_profile.clone())
            .or_else(|| non_empty_env("AWS_PROFILE"))
            .unwrap_or_else(|| "default".to_string());
        let region = region
            .or_else(|| self.default_region.clone())
            .or_else(|| non_empty_env("AWS_REGION"))
            .or_else(|| non_empty_env("AWS_DEFAULT_REGION"))
            .unwrap_or_else(|| FALLBACK_REGION.to_string());
        Scope::new(profile, region)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn discover_config_path() -> Option<PathBuf> {
    if let Some(path) = non_empty_env("STRATUS_CONFIG") {
        return Some(PathBuf::from(path));
    }

    let cwd_candidates = [PathBuf::from("stratus.yaml"), PathBuf::from(".stratus.yaml")];
    if let Some(found) = cwd_candidates.into_iter().find(|candidate| candidate.exists()) {
        return Some(found);
    }

    let home = non_empty_env("HOME")?;
    let user_config = PathBuf::from(home).join(".config/stratus/config.yaml");
    user_config.exists().then_some(user_config)
}

#[cfg(test)]
mod tests {
    use super::StratusConfig;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write config");
        file
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let file = write_config("page_size: 20\naliases:\n  cw: logs\n");
        let config = StratusConfig::load(Some(file.path())).expect("config loads");
        assert_eq!(config.page_size(), 20);
        assert_eq!(config.aws_binary, "aws");
        assert_eq!(config.call_timeout_secs, 20);
        assert_eq!(config.aliases.get("cw").map(String::as_str), Some("logs"));
        assert_eq!(config.source.as_deref(), Some(file.path()));
    }

    #[test]
    fn page_size_is_clamped() {
        let zero = StratusConfig {
            page_size: 0,
            ..StratusConfig::default()
        };
        let huge = StratusConfig {
            page_size: 50_000,
            ..StratusConfig::default()
        };
        assert_eq!(zero.page_size(), 1);
        assert_eq!(huge.page_size(), 1_000);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let file = write_config("page_size: [not, a, number]\n");
        let error = StratusConfig::load(Some(file.path())).expect_err("parse fails");
        assert!(format!("{error:#}").contains("failed to parse config"));
    }

    #[test]
    fn empty_file_is_defaults() {
        let file = write_config("\n");
        let config = StratusConfig::load(Some(file.path())).expect("config loads");
        assert_eq!(config.page_size(), 50);
    }

    #[test]
    fn bookmarks_file_overrides_default_location() {
        let file = write_config("bookmarks_file: /tmp/marks.yaml\n");
        let config = StratusConfig::load(Some(file.path())).expect("config loads");
        assert_eq!(config.bookmarks_path(), std::path::PathBuf::from("/tmp/marks.yaml"));
        assert!(
            StratusConfig::default()
                .bookmarks_path()
                .ends_with("bookmarks.yaml")
        );
    }

    #[test]
    fn explicit_scope_overrides_file() {
        let config = StratusConfig {
            default_profile: Some("staging".to_string()),
            default_region: Some("eu-central-1".to_string()),
            ..StratusConfig::default()
        };
        let scope = config.initial_scope(Some("prod".to_string()), None);
        assert_eq!(scope.profile, "prod");
        assert_eq!(scope.region, "eu-central-1");
    }
}
