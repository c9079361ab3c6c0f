//! Configuration file loader for rustore-publisher
//!
//! This module loads the YAML config file, selects a named instance and
//! layers environment and CLI overrides on top before validation.

use super::config::*;
use crate::core::error::{PublishError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::fs;
use tracing::{debug, warn};

/// Configuration file name
pub const CONFIG_FILENAME: &str = "rustore-publish.yaml";

/// Environment variable pattern (${VAR_NAME})
static ENV_VAR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("valid regex"));

/// Layout of the config file
///
/// ```yaml
/// defaults:
///   applicationId: ru.example.app
///   credentialsPath: rustore-credentials.json
/// instances:
///   release:
///     buildFormat: aab
///   huawei:
///     buildFormat: apk
///     mobileServicesType: hms
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Settings shared by every instance
    #[serde(default)]
    pub defaults: RawPublishConfig,

    /// Named publish configurations, e.g. one per build variant
    #[serde(default)]
    pub instances: BTreeMap<String, RawPublishConfig>,
}

/// Configuration load options
#[derive(Debug, Clone, Default)]
pub struct ConfigLoadOptions {
    /// Project path to look for the config file in
    pub project_path: PathBuf,

    /// Explicit config file; must exist when given
    pub config_path: Option<PathBuf>,

    /// Instance to select from the config file
    pub instance: Option<String>,

    /// CLI arguments (highest priority)
    pub cli_args: Option<RawPublishConfig>,

    /// Environment variables
    pub env: HashMap<String, String>,
}

/// Configuration file loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from all sources
    ///
    /// Priority (high to low):
    /// 1. CLI arguments
    /// 2. Environment variables (`RUSTORE_*`)
    /// 3. Selected instance of the config file
    /// 4. `defaults` of the config file
    /// 5. Built-in defaults
    pub async fn load(options: ConfigLoadOptions) -> Result<PublishConfig> {
        let raw = Self::load_raw(options).await?;
        PublishConfig::try_from(raw)
    }

    /// Load and merge all layers without validating the result
    pub async fn load_raw(options: ConfigLoadOptions) -> Result<RawPublishConfig> {
        let file = match &options.config_path {
            Some(path) => Some(Self::load_config_file(path).await?.ok_or_else(|| {
                PublishError::config(
                    "config",
                    format!("config file {} does not exist", path.display()),
                )
            })?),
            None => Self::load_config_file(&options.project_path.join(CONFIG_FILENAME)).await?,
        };

        let mut merged = RawPublishConfig {
            project_dir: Some(options.project_path.clone()),
            ..Default::default()
        };

        if let Some(file) = file {
            merged = merged.merge(Self::select_instance(file, options.instance.as_deref())?);
        } else if let Some(instance) = &options.instance {
            return Err(PublishError::config(
                "instance",
                format!("instance `{}` requested but no config file was found", instance),
            ));
        }

        if let Some(env_config) = Self::load_env_config(&options.env)? {
            merged = merged.merge(env_config);
        }

        if let Some(cli_config) = options.cli_args {
            merged = merged.merge(cli_config);
        }

        Ok(Self::expand_env_vars(merged, &options.env))
    }

    /// Load configuration from YAML file, `None` if it does not exist
    async fn load_config_file(file_path: &Path) -> Result<Option<ConfigFile>> {
        if !fs::try_exists(file_path).await.unwrap_or(false) {
            debug!("No config file at {}", file_path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(file_path).await.map_err(|e| {
            PublishError::config(
                "config",
                format!("failed to read {}: {}", file_path.display(), e),
            )
        })?;

        let config: ConfigFile = serde_yaml::from_str(&content).map_err(|e| {
            PublishError::config(
                "config",
                format!("failed to parse {}: {}", file_path.display(), e),
            )
        })?;

        debug!(
            "Loaded {} with {} instance(s)",
            file_path.display(),
            config.instances.len()
        );
        Ok(Some(config))
    }

    /// Merge the file defaults with the requested (or only) instance
    fn select_instance(mut file: ConfigFile, instance: Option<&str>) -> Result<RawPublishConfig> {
        let selected = match instance {
            Some(name) => Some(file.instances.remove(name).ok_or_else(|| {
                PublishError::config(
                    "instance",
                    format!(
                        "unknown instance `{}` (defined: {})",
                        name,
                        file.instances.keys().cloned().collect::<Vec<_>>().join(", ")
                    ),
                )
            })?),
            None if file.instances.len() > 1 => {
                return Err(PublishError::config(
                    "instance",
                    format!(
                        "several instances defined ({}), select one with --instance",
                        file.instances.keys().cloned().collect::<Vec<_>>().join(", ")
                    ),
                ));
            }
            None => file.instances.into_values().next(),
        };

        Ok(match selected {
            Some(instance) => file.defaults.merge(instance),
            None => file.defaults,
        })
    }

    /// Load configuration from `RUSTORE_*` environment variables
    fn load_env_config(env: &HashMap<String, String>) -> Result<Option<RawPublishConfig>> {
        let mut config = RawPublishConfig::default();
        let mut has_changes = false;

        let get = |name: &str| {
            env.get(name)
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
        };

        if let Some(value) = get("RUSTORE_APPLICATION_ID") {
            config.application_id = Some(value.to_string());
            has_changes = true;
        }

        if let Some(value) = get("RUSTORE_CREDENTIALS_PATH") {
            config.credentials_path = Some(PathBuf::from(value));
            has_changes = true;
        }

        if let Some(value) = get("RUSTORE_PUBLISH_TYPE") {
            config.publish_type =
                Some(value.parse().map_err(|e| PublishError::config("publishType", e))?);
            has_changes = true;
        }

        if let Some(value) = get("RUSTORE_REQUEST_TIMEOUT") {
            config.request_timeout = Some(value.parse().map_err(|_| {
                PublishError::config(
                    "requestTimeout",
                    format!("RUSTORE_REQUEST_TIMEOUT `{}` is not a number of seconds", value),
                )
            })?);
            has_changes = true;
        }

        if let Some(value) = get("RUSTORE_MOBILE_SERVICES_TYPE") {
            config.mobile_services_type = Some(
                value
                    .parse()
                    .map_err(|e| PublishError::config("mobileServicesType", e))?,
            );
            has_changes = true;
        }

        if let Some(value) = get("RUSTORE_BUILD_FORMAT") {
            config.build_format =
                Some(value.parse().map_err(|e| PublishError::config("buildFormat", e))?);
            has_changes = true;
        }

        if let Some(value) = get("RUSTORE_BUILD_FILE") {
            config.build_file = Some(PathBuf::from(value));
            has_changes = true;
        }

        Ok(if has_changes { Some(config) } else { None })
    }

    /// Expand `${VAR}` references in path settings
    fn expand_env_vars(
        mut config: RawPublishConfig,
        env: &HashMap<String, String>,
    ) -> RawPublishConfig {
        let expand_path = |path: PathBuf| match path.to_str() {
            Some(text) => PathBuf::from(Self::expand_string(text, env)),
            None => path,
        };

        config.credentials_path = config.credentials_path.map(expand_path);
        config.build_file = config.build_file.map(expand_path);
        config.project_dir = config.project_dir.map(expand_path);
        if let Some(notes) = &mut config.release_notes {
            for note in notes.iter_mut() {
                note.file_path = expand_path(std::mem::take(&mut note.file_path));
            }
        }

        config
    }

    /// Expand environment variables in a single string
    ///
    /// Unknown variables are left untouched.
    fn expand_string(input: &str, env: &HashMap<String, String>) -> String {
        ENV_VAR_REGEX
            .replace_all(input, |caps: &regex::Captures| {
                let var_name = &caps[1];
                match env.get(var_name) {
                    Some(value) => value.clone(),
                    None => {
                        warn!("Environment variable {} is not set, leaving it unexpanded", var_name);
                        caps[0].to_string()
                    }
                }
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    const CONFIG: &str = r#"
defaults:
  applicationId: ru.example.app
  credentialsPath: ${HOME_DIR}/rustore.json
  requestTimeout: 100
instances:
  release:
    buildFormat: aab
  huawei:
    buildFormat: apk
    mobileServicesType: hms
    publishType: manual
"#;

    async fn project_with_config(content: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILENAME), content)
            .await
            .unwrap();
        dir
    }

    fn options(dir: &TempDir, instance: Option<&str>) -> ConfigLoadOptions {
        ConfigLoadOptions {
            project_path: dir.path().to_path_buf(),
            instance: instance.map(str::to_string),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_load_selected_instance() {
        let dir = project_with_config(CONFIG).await;

        let config = ConfigLoader::load(options(&dir, Some("huawei"))).await.unwrap();

        assert_eq!(config.application_id(), "ru.example.app");
        assert_eq!(config.build_format(), BuildFormat::Apk);
        assert_eq!(config.services_type(), ServicesType::Hms);
        assert_eq!(config.publish_type(), PublishType::Manual);
        assert_eq!(config.request_timeout(), Duration::from_secs(100));
        assert!(config.build_file().starts_with(dir.path()));
    }

    #[tokio::test]
    async fn test_several_instances_require_selection() {
        let dir = project_with_config(CONFIG).await;

        let result = ConfigLoader::load(options(&dir, None)).await;
        assert!(matches!(result, Err(PublishError::Config { ref field, .. }) if field == "instance"));

        let result = ConfigLoader::load(options(&dir, Some("beta"))).await;
        assert!(matches!(result, Err(PublishError::Config { ref field, .. }) if field == "instance"));
    }

    #[tokio::test]
    async fn test_single_instance_selected_implicitly() {
        let dir = project_with_config(
            "instances:\n  release:\n    applicationId: ru.example.app\n    buildFormat: apk\n",
        )
        .await;

        let config = ConfigLoader::load(options(&dir, None)).await.unwrap();
        assert_eq!(config.build_format(), BuildFormat::Apk);
    }

    #[tokio::test]
    async fn test_priority_cli_over_env_over_file() {
        let dir = project_with_config(CONFIG).await;

        let mut env = HashMap::new();
        env.insert("RUSTORE_REQUEST_TIMEOUT".to_string(), "200".to_string());
        env.insert("RUSTORE_PUBLISH_TYPE".to_string(), "instantly".to_string());

        let load_options = ConfigLoadOptions {
            env,
            cli_args: Some(RawPublishConfig {
                request_timeout: Some(600),
                ..Default::default()
            }),
            ..options(&dir, Some("huawei"))
        };

        let config = ConfigLoader::load(load_options).await.unwrap();
        assert_eq!(config.request_timeout(), Duration::from_secs(600));
        assert_eq!(config.publish_type(), PublishType::Instantly);
    }

    #[tokio::test]
    async fn test_invalid_env_value() {
        let dir = project_with_config(CONFIG).await;
        let mut env = HashMap::new();
        env.insert("RUSTORE_BUILD_FORMAT".to_string(), "ipa".to_string());

        let result = ConfigLoader::load(ConfigLoadOptions {
            env,
            ..options(&dir, Some("release"))
        })
        .await;
        assert!(matches!(result, Err(PublishError::Config { ref field, .. }) if field == "buildFormat"));
    }

    #[tokio::test]
    async fn test_expands_env_vars_in_paths() {
        let dir = project_with_config(CONFIG).await;
        let mut env = HashMap::new();
        env.insert("HOME_DIR".to_string(), "/secrets".to_string());

        let config = ConfigLoader::load(ConfigLoadOptions {
            env,
            ..options(&dir, Some("release"))
        })
        .await
        .unwrap();
        assert_eq!(
            config.credentials_path(),
            Some(Path::new("/secrets/rustore.json"))
        );
    }

    #[tokio::test]
    async fn test_missing_explicit_config_file() {
        let dir = TempDir::new().unwrap();
        let result = ConfigLoader::load(ConfigLoadOptions {
            config_path: Some(dir.path().join("nope.yaml")),
            ..options(&dir, None)
        })
        .await;
        assert!(matches!(result, Err(PublishError::Config { ref field, .. }) if field == "config"));
    }

    #[tokio::test]
    async fn test_without_config_file_uses_cli_only() {
        let dir = TempDir::new().unwrap();
        let config = ConfigLoader::load(ConfigLoadOptions {
            cli_args: Some(RawPublishConfig {
                application_id: Some("ru.example.app".to_string()),
                build_format: Some(BuildFormat::Apk),
                ..Default::default()
            }),
            ..options(&dir, None)
        })
        .await
        .unwrap();
        assert_eq!(config.application_id(), "ru.example.app");
    }

    #[tokio::test]
    async fn test_malformed_yaml() {
        let dir = project_with_config("defaults: [").await;
        let result = ConfigLoader::load(options(&dir, None)).await;
        assert!(matches!(result, Err(PublishError::Config { ref field, .. }) if field == "config"));
    }

    #[test]
    fn test_expand_string() {
        let mut env = HashMap::new();
        env.insert("CI_DIR".to_string(), "/ci".to_string());

        assert_eq!(
            ConfigLoader::expand_string("${CI_DIR}/creds.json", &env),
            "/ci/creds.json"
        );
        assert_eq!(
            ConfigLoader::expand_string("${MISSING}/creds.json", &env),
            "${MISSING}/creds.json"
        );
    }
}
