//! Configuration for the avahi tools.
//!
//! Configuration is layered. Later layers override earlier ones field by field:
//!
//! 1. Global config: `~/.config/avahictl/config.json` (or the platform config dir)
//! 2. `AVAHICTL_CONFIG_CONTENT` environment variable
//! 3. Project config: `avahictl.jsonc` or `avahictl.json` in the project directory
//!
//! Files may contain `//` and `/* */` comments.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DiscoverError, DiscoverResult};

/// Default discovery tool.
pub const DEFAULT_BROWSE_PROGRAM: &str = "avahi-browse";
/// Default publishing tool.
pub const DEFAULT_PUBLISH_PROGRAM: &str = "avahi-publish-service";
/// Default time to wait for the browse tool to exit once its output closes.
pub const DEFAULT_EXIT_GRACE_MS: u64 = 2_000;

/// Environment variable holding inline configuration.
pub const CONFIG_CONTENT_ENV: &str = "AVAHICTL_CONFIG_CONTENT";

/// Resolved tool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverConfig {
    /// Discovery tool (`avahi-browse`).
    pub browse_program: String,
    /// Publishing tool (`avahi-publish-service`).
    pub publish_program: String,
    /// Browse domain other than the default.
    pub domain: Option<String>,
    /// Skip services published on this host.
    pub ignore_local: bool,
    /// Extra arguments passed to the discovery tool before the service type.
    pub extra_browse_args: Vec<String>,
    /// How long to wait for the discovery tool to exit after its output closes.
    pub exit_grace_ms: u64,
}

impl Default for DiscoverConfig {
    fn default() -> Self {
        Self {
            browse_program: DEFAULT_BROWSE_PROGRAM.to_string(),
            publish_program: DEFAULT_PUBLISH_PROGRAM.to_string(),
            domain: None,
            ignore_local: false,
            extra_browse_args: Vec::new(),
            exit_grace_ms: DEFAULT_EXIT_GRACE_MS,
        }
    }
}

impl DiscoverConfig {
    /// Arguments for a browse that ends once the initial listing is complete.
    pub fn one_shot_args(&self, service_type: &str) -> Vec<String> {
        let mut args = vec!["-t".to_string()];
        args.extend(self.browse_args(service_type));
        args
    }

    /// Arguments for a browse that keeps running until killed.
    pub fn streaming_args(&self, service_type: &str) -> Vec<String> {
        self.browse_args(service_type)
    }

    fn browse_args(&self, service_type: &str) -> Vec<String> {
        let mut args = vec!["-r".to_string()];
        if let Some(ref domain) = self.domain {
            args.push("-d".to_string());
            args.push(domain.clone());
        }
        if self.ignore_local {
            args.push("-l".to_string());
        }
        args.extend(self.extra_browse_args.iter().cloned());
        args.push(service_type.to_string());
        args
    }

    pub fn exit_grace(&self) -> Duration {
        Duration::from_millis(self.exit_grace_ms)
    }

    /// Load configuration from all sources.
    ///
    /// Returns the merged configuration and the files it was read from.
    pub async fn load(project_dir: Option<&Path>) -> DiscoverResult<(Self, Vec<PathBuf>)> {
        let mut layer = ConfigLayer::default();
        let mut sources = Vec::new();

        if let Some(global_dir) = Self::global_config_dir() {
            for name in ["config.json", "avahictl.json", "avahictl.jsonc"] {
                let path = global_dir.join(name);
                if path.exists() {
                    layer = layer.merge(ConfigLayer::load_file(&path).await?);
                    sources.push(path);
                    break;
                }
            }
        }

        if let Ok(content) = std::env::var(CONFIG_CONTENT_ENV) {
            layer = layer.merge(ConfigLayer::parse(&content, "<env>")?);
        }

        if let Some(dir) = project_dir {
            for name in ["avahictl.jsonc", "avahictl.json"] {
                let path = dir.join(name);
                if path.exists() {
                    layer = layer.merge(ConfigLayer::load_file(&path).await?);
                    sources.push(path);
                    break;
                }
            }
        }

        Ok((layer.resolve(), sources))
    }

    /// Get the global config directory.
    ///
    /// On Unix, `~/.config/avahictl` wins when it exists.
    pub fn global_config_dir() -> Option<PathBuf> {
        #[cfg(unix)]
        {
            if let Some(home) = dirs::home_dir() {
                let xdg_config = home.join(".config").join("avahictl");
                if xdg_config.exists() {
                    return Some(xdg_config);
                }
            }
        }

        dirs::config_dir().map(|d| d.join("avahictl"))
    }
}

/// One configuration source. Unset fields defer to earlier layers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigLayer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browse_program: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_program: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_local: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_browse_args: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_grace_ms: Option<u64>,
}

impl ConfigLayer {
    /// Merge with another layer (other takes precedence).
    pub fn merge(mut self, other: Self) -> Self {
        if other.browse_program.is_some() {
            self.browse_program = other.browse_program;
        }
        if other.publish_program.is_some() {
            self.publish_program = other.publish_program;
        }
        if other.domain.is_some() {
            self.domain = other.domain;
        }
        if other.ignore_local.is_some() {
            self.ignore_local = other.ignore_local;
        }
        if other.extra_browse_args.is_some() {
            self.extra_browse_args = other.extra_browse_args;
        }
        if other.exit_grace_ms.is_some() {
            self.exit_grace_ms = other.exit_grace_ms;
        }
        self
    }

    /// Fill unset fields with defaults.
    pub fn resolve(self) -> DiscoverConfig {
        let defaults = DiscoverConfig::default();
        DiscoverConfig {
            browse_program: self.browse_program.unwrap_or(defaults.browse_program),
            publish_program: self.publish_program.unwrap_or(defaults.publish_program),
            domain: self.domain.or(defaults.domain),
            ignore_local: self.ignore_local.unwrap_or(defaults.ignore_local),
            extra_browse_args: self.extra_browse_args.unwrap_or(defaults.extra_browse_args),
            exit_grace_ms: self.exit_grace_ms.unwrap_or(defaults.exit_grace_ms),
        }
    }

    /// Load a layer from a file.
    pub async fn load_file(path: &Path) -> DiscoverResult<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content, &path.display().to_string())
    }

    /// Parse JSONC (JSON with comments).
    pub fn parse(content: &str, source: &str) -> DiscoverResult<Self> {
        let stripped = strip_comments(content);
        serde_json::from_str(&stripped).map_err(|e| DiscoverError::config(source, e.to_string()))
    }
}

/// Remove `//` and `/* */` comments outside of string literals.
fn strip_comments(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            result.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match (c, chars.peek()) {
            ('"', _) => {
                in_string = true;
                result.push(c);
            }
            ('/', Some('/')) => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        result.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            _ => result.push(c),
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DiscoverConfig::default();
        assert_eq!(config.browse_program, "avahi-browse");
        assert_eq!(config.publish_program, "avahi-publish-service");
        assert_eq!(config.exit_grace(), Duration::from_secs(2));
        assert!(!config.ignore_local);
    }

    #[test]
    fn test_one_shot_args() {
        let config = DiscoverConfig::default();
        assert_eq!(
            config.one_shot_args("_musicbox._tcp"),
            vec!["-t", "-r", "_musicbox._tcp"]
        );
    }

    #[test]
    fn test_streaming_args_have_no_terminate_flag() {
        let config = DiscoverConfig {
            domain: Some("example.org".to_string()),
            ignore_local: true,
            extra_browse_args: vec!["--no-db-lookup".to_string()],
            ..Default::default()
        };
        assert_eq!(
            config.streaming_args("_http._tcp"),
            vec!["-r", "-d", "example.org", "-l", "--no-db-lookup", "_http._tcp"]
        );
    }

    #[test]
    fn test_layer_merge_other_wins() {
        let base = ConfigLayer {
            browse_program: Some("base-browse".to_string()),
            ignore_local: Some(true),
            ..Default::default()
        };
        let other = ConfigLayer {
            browse_program: Some("other-browse".to_string()),
            exit_grace_ms: Some(10),
            ..Default::default()
        };
        let merged = base.merge(other).resolve();
        assert_eq!(merged.browse_program, "other-browse");
        assert!(merged.ignore_local);
        assert_eq!(merged.exit_grace_ms, 10);
        assert_eq!(merged.publish_program, DEFAULT_PUBLISH_PROGRAM);
    }

    #[test]
    fn test_parse_jsonc() {
        let layer = ConfigLayer::parse(
            r#"{
                // line comment
                "browseProgram": "/usr/bin/avahi-browse", /* block */
                "domain": "http://not-a-comment"
            }"#,
            "test",
        )
        .unwrap();
        assert_eq!(layer.browse_program.as_deref(), Some("/usr/bin/avahi-browse"));
        assert_eq!(layer.domain.as_deref(), Some("http://not-a-comment"));
    }

    #[test]
    fn test_parse_invalid_json() {
        let err = ConfigLayer::parse("{ not json", "broken.json").unwrap_err();
        assert!(matches!(err, DiscoverError::Config { ref path, .. } if path == "broken.json"));
    }

    #[test]
    fn test_strip_comments_keeps_escaped_quotes() {
        let input = r#"{"a": "say \"//hi\""} // trailing"#;
        assert_eq!(strip_comments(input), r#"{"a": "say \"//hi\""} "#);
    }

    #[tokio::test]
    async fn test_load_project_config() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(
            temp.path().join("avahictl.json"),
            r#"{ "publishProgram": "avahi-publish", "exitGraceMs": 50 }"#,
        )
        .unwrap();

        let (config, sources) = DiscoverConfig::load(Some(temp.path())).await.unwrap();
        assert_eq!(config.publish_program, "avahi-publish");
        assert_eq!(config.exit_grace_ms, 50);
        assert!(sources.contains(&temp.path().join("avahictl.json")));
    }

    #[tokio::test]
    async fn test_jsonc_file_preferred() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("avahictl.json"), r#"{ "domain": "json" }"#).unwrap();
        std::fs::write(
            temp.path().join("avahictl.jsonc"),
            "{ // comment\n \"domain\": \"jsonc\" }",
        )
        .unwrap();

        let (config, _) = DiscoverConfig::load(Some(temp.path())).await.unwrap();
        assert_eq!(config.domain.as_deref(), Some("jsonc"));
    }
}
