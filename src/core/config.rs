//! Configuration structures and types for rustore-publisher
//!
//! [`RawPublishConfig`] is the loosely-typed form read from files, the
//! environment and the CLI. [`PublishConfig`] is the validated, immutable
//! form the orchestrator consumes; every default is applied in its
//! `TryFrom` implementation.

use super::error::{PublishError, Result};
use super::seo_tag::SeoTag;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::warn;

/// Default time budget for a single request and for status polling
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Default locale used to pick the release note
pub const DEFAULT_TARGET_LOCALE: &str = "ru-RU";

/// Default Android build variant
pub const DEFAULT_VARIANT: &str = "release";

/// Default project directory
pub const DEFAULT_PROJECT_DIR: &str = ".";

static APPLICATION_ID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_]*(\.[A-Za-z][A-Za-z0-9_]*)+$").expect("valid regex")
});

static LOCALE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z]{2,3}([-_][A-Za-z0-9]{2,8})*$").expect("valid regex")
});

/// When the application goes live after review
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PublishType {
    /// Published right after the review is passed
    #[default]
    #[serde(alias = "INSTANTLY")]
    Instantly,
    /// Published by hand from the console after the review is passed
    #[serde(alias = "MANUAL")]
    Manual,
}

impl PublishType {
    /// Value sent in the draft request
    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::Instantly => "INSTANTLY",
            Self::Manual => "MANUAL",
        }
    }
}

impl FromStr for PublishType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "instantly" => Ok(Self::Instantly),
            "manual" => Ok(Self::Manual),
            other => Err(format!(
                "unknown publish type `{}` (expected instantly or manual)",
                other
            )),
        }
    }
}

/// Mobile services framework the build targets
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServicesType {
    #[default]
    #[serde(alias = "Unknown", alias = "UNKNOWN")]
    Unknown,
    #[serde(alias = "HMS")]
    Hms,
}

impl ServicesType {
    /// Value sent as the `servicesType` upload parameter
    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Hms => "HMS",
        }
    }
}

impl FromStr for ServicesType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unknown" => Ok(Self::Unknown),
            "hms" => Ok(Self::Hms),
            other => Err(format!(
                "unknown mobile services type `{}` (expected unknown or hms)",
                other
            )),
        }
    }
}

/// Package format of the build artifact
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BuildFormat {
    #[serde(alias = "APK")]
    Apk,
    #[serde(alias = "AAB")]
    Aab,
}

impl BuildFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Apk => "apk",
            Self::Aab => "aab",
        }
    }

    /// Gradle output directory name for this format
    fn output_dir(&self) -> &'static str {
        match self {
            Self::Apk => "apk",
            Self::Aab => "bundle",
        }
    }
}

impl fmt::Display for BuildFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for BuildFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "apk" => Ok(Self::Apk),
            "aab" => Ok(Self::Aab),
            other => Err(format!(
                "unknown build format `{}` (expected apk or aab)",
                other
            )),
        }
    }
}

/// Release notes for one locale, read from a text file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseNote {
    pub lang: String,
    pub file_path: PathBuf,
}

/// Staged rollout settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ReleasePhase {
    /// Share of users receiving the version, in (0, 100]
    pub percent: f64,
}

/// Unvalidated configuration as read from a config file, env or CLI
///
/// Every field is optional so that layers can be merged; see
/// [`RawPublishConfig::merge`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawPublishConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_type: Option<PublishType>,

    /// Seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile_services_type: Option<ServicesType>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_format: Option<BuildFormat>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_file: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_dir: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_notes: Option<Vec<ReleaseNote>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_locale: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_time: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_phase: Option<ReleasePhase>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub seo_tags: Option<Vec<SeoTag>>,
}

impl RawPublishConfig {
    /// Layer `overlay` on top of `self`; fields set in `overlay` win
    pub fn merge(self, overlay: RawPublishConfig) -> RawPublishConfig {
        RawPublishConfig {
            application_id: overlay.application_id.or(self.application_id),
            credentials_path: overlay.credentials_path.or(self.credentials_path),
            publish_type: overlay.publish_type.or(self.publish_type),
            request_timeout: overlay.request_timeout.or(self.request_timeout),
            mobile_services_type: overlay.mobile_services_type.or(self.mobile_services_type),
            build_format: overlay.build_format.or(self.build_format),
            build_file: overlay.build_file.or(self.build_file),
            project_dir: overlay.project_dir.or(self.project_dir),
            variant: overlay.variant.or(self.variant),
            release_notes: overlay.release_notes.or(self.release_notes),
            target_locale: overlay.target_locale.or(self.target_locale),
            release_time: overlay.release_time.or(self.release_time),
            release_phase: overlay.release_phase.or(self.release_phase),
            seo_tags: overlay.seo_tags.or(self.seo_tags),
        }
    }
}

/// Validated, immutable publish configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PublishConfig {
    application_id: String,
    credentials_path: Option<PathBuf>,
    publish_type: PublishType,
    request_timeout: Duration,
    services_type: ServicesType,
    build_format: BuildFormat,
    build_file: PathBuf,
    release_notes: Vec<ReleaseNote>,
    target_locale: String,
    release_time: Option<String>,
    release_phase: Option<ReleasePhase>,
    seo_tags: BTreeSet<SeoTag>,
}

impl PublishConfig {
    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    pub fn credentials_path(&self) -> Option<&Path> {
        self.credentials_path.as_deref()
    }

    pub fn publish_type(&self) -> PublishType {
        self.publish_type
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn services_type(&self) -> ServicesType {
        self.services_type
    }

    pub fn build_format(&self) -> BuildFormat {
        self.build_format
    }

    pub fn build_file(&self) -> &Path {
        &self.build_file
    }

    pub fn release_notes(&self) -> &[ReleaseNote] {
        &self.release_notes
    }

    pub fn target_locale(&self) -> &str {
        &self.target_locale
    }

    /// Reserved until the store exposes delayed publication
    pub fn release_time(&self) -> Option<&str> {
        self.release_time.as_deref()
    }

    pub fn release_phase(&self) -> Option<ReleasePhase> {
        self.release_phase
    }

    pub fn seo_tags(&self) -> &BTreeSet<SeoTag> {
        &self.seo_tags
    }
}

impl TryFrom<RawPublishConfig> for PublishConfig {
    type Error = PublishError;

    fn try_from(raw: RawPublishConfig) -> Result<Self> {
        let application_id = non_blank(raw.application_id)
            .ok_or_else(|| PublishError::config("applicationId", "is required"))?;
        if !APPLICATION_ID_REGEX.is_match(&application_id) {
            return Err(PublishError::config(
                "applicationId",
                format!("`{}` is not a valid Android package name", application_id),
            ));
        }

        let build_format = raw
            .build_format
            .ok_or_else(|| PublishError::config("buildFormat", "is required (apk or aab)"))?;

        let timeout_secs = raw.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(PublishError::config(
                "requestTimeout",
                "must be greater than 0",
            ));
        }

        let project_dir = raw
            .project_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROJECT_DIR));
        let variant = non_blank(raw.variant).unwrap_or_else(|| DEFAULT_VARIANT.to_string());

        let build_file = match raw.build_file {
            Some(path) => {
                check_extension(&path, build_format)?;
                project_dir.join(path)
            }
            None => default_build_file(&project_dir, &variant, build_format),
        };

        if let Some(phase) = raw.release_phase {
            // NaN fails both comparisons
            if !(phase.percent > 0.0 && phase.percent <= 100.0) {
                return Err(PublishError::config(
                    "releasePhase.percent",
                    format!("must be in (0, 100], got {}", phase.percent),
                ));
            }
        }

        let release_notes = validate_release_notes(raw.release_notes.unwrap_or_default())?
            .into_iter()
            .map(|note| ReleaseNote {
                lang: note.lang.trim().to_string(),
                file_path: project_dir.join(&note.file_path),
            })
            .collect();

        let target_locale =
            non_blank(raw.target_locale).unwrap_or_else(|| DEFAULT_TARGET_LOCALE.to_string());
        if !LOCALE_REGEX.is_match(&target_locale) {
            return Err(PublishError::config(
                "targetLocale",
                format!("`{}` is not a locale tag", target_locale),
            ));
        }

        let release_time = non_blank(raw.release_time);
        if let Some(ref time) = release_time {
            chrono::DateTime::parse_from_rfc3339(time).map_err(|e| {
                PublishError::config("releaseTime", format!("`{}` is not RFC 3339: {}", time, e))
            })?;
            warn!("releaseTime is set but delayed publication is not supported yet, ignoring it");
        }

        Ok(Self {
            application_id,
            credentials_path: raw.credentials_path.map(|path| project_dir.join(path)),
            publish_type: raw.publish_type.unwrap_or_default(),
            request_timeout: Duration::from_secs(timeout_secs),
            services_type: raw.mobile_services_type.unwrap_or_default(),
            build_format,
            build_file,
            release_notes,
            target_locale,
            release_time,
            release_phase: raw.release_phase,
            seo_tags: raw.seo_tags.unwrap_or_default().into_iter().collect(),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn check_extension(path: &Path, format: BuildFormat) -> Result<()> {
    let matches = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(format.extension()));

    if matches {
        Ok(())
    } else {
        Err(PublishError::config(
            "buildFile",
            format!(
                "`{}` does not have the .{} extension required by buildFormat",
                path.display(),
                format.extension()
            ),
        ))
    }
}

/// Standard Gradle output path of a build variant
fn default_build_file(project_dir: &Path, variant: &str, format: BuildFormat) -> PathBuf {
    project_dir
        .join("build")
        .join("outputs")
        .join(format.output_dir())
        .join(variant)
        .join(format!("app-{}.{}", variant, format.extension()))
}

fn validate_release_notes(notes: Vec<ReleaseNote>) -> Result<Vec<ReleaseNote>> {
    let mut seen = HashSet::new();

    for note in &notes {
        if !LOCALE_REGEX.is_match(note.lang.trim()) {
            return Err(PublishError::config(
                "releaseNotes.lang",
                format!("`{}` is not a locale tag", note.lang),
            ));
        }
        if note.file_path.as_os_str().is_empty() {
            return Err(PublishError::config(
                "releaseNotes.filePath",
                format!("is empty for `{}`", note.lang),
            ));
        }
        if !seen.insert(note.lang.trim().to_lowercase()) {
            return Err(PublishError::config(
                "releaseNotes.lang",
                format!("`{}` is listed more than once", note.lang),
            ));
        }
    }

    Ok(notes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> RawPublishConfig {
        RawPublishConfig {
            application_id: Some("ru.example.app".to_string()),
            build_format: Some(BuildFormat::Apk),
            ..Default::default()
        }
    }

    fn assert_config_error(raw: RawPublishConfig, field: &str) {
        match PublishConfig::try_from(raw) {
            Err(PublishError::Config { field: f, .. }) => assert_eq!(f, field),
            other => panic!("expected config error on {}, got {:?}", field, other),
        }
    }

    #[test]
    fn test_defaults() {
        let config = PublishConfig::try_from(minimal()).unwrap();
        assert_eq!(config.publish_type(), PublishType::Instantly);
        assert_eq!(config.request_timeout(), Duration::from_secs(300));
        assert_eq!(config.services_type(), ServicesType::Unknown);
        assert_eq!(config.target_locale(), "ru-RU");
        assert_eq!(
            config.build_file(),
            Path::new("./build/outputs/apk/release/app-release.apk")
        );
        assert!(config.release_notes().is_empty());
        assert!(config.release_phase().is_none());
        assert!(config.seo_tags().is_empty());
        assert!(config.credentials_path().is_none());
    }

    #[test]
    fn test_default_aab_path_uses_variant() {
        let raw = RawPublishConfig {
            build_format: Some(BuildFormat::Aab),
            variant: Some("beta".to_string()),
            project_dir: Some(PathBuf::from("app")),
            ..minimal()
        };
        let config = PublishConfig::try_from(raw).unwrap();
        assert_eq!(
            config.build_file(),
            Path::new("app/build/outputs/bundle/beta/app-beta.aab")
        );
    }

    #[test]
    fn test_missing_required_fields() {
        assert_config_error(
            RawPublishConfig {
                application_id: None,
                ..minimal()
            },
            "applicationId",
        );
        assert_config_error(
            RawPublishConfig {
                build_format: None,
                ..minimal()
            },
            "buildFormat",
        );
    }

    #[test]
    fn test_invalid_application_id() {
        assert_config_error(
            RawPublishConfig {
                application_id: Some("not a package".to_string()),
                ..minimal()
            },
            "applicationId",
        );
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert_config_error(
            RawPublishConfig {
                request_timeout: Some(0),
                ..minimal()
            },
            "requestTimeout",
        );
    }

    #[test]
    fn test_release_phase_bounds() {
        for percent in [0.0, -5.0, 100.5, f64::NAN, f64::INFINITY] {
            assert_config_error(
                RawPublishConfig {
                    release_phase: Some(ReleasePhase { percent }),
                    ..minimal()
                },
                "releasePhase.percent",
            );
        }

        for percent in [0.5, 25.0, 100.0] {
            let config = PublishConfig::try_from(RawPublishConfig {
                release_phase: Some(ReleasePhase { percent }),
                ..minimal()
            })
            .unwrap();
            assert_eq!(config.release_phase(), Some(ReleasePhase { percent }));
        }
    }

    #[test]
    fn test_build_file_extension_mismatch() {
        let cases = [
            (BuildFormat::Apk, "out/app.aab"),
            (BuildFormat::Aab, "out/app.apk"),
            (BuildFormat::Apk, "out/app"),
            (BuildFormat::Aab, "out/app.zip"),
        ];
        for (format, path) in cases {
            assert_config_error(
                RawPublishConfig {
                    build_format: Some(format),
                    build_file: Some(PathBuf::from(path)),
                    ..minimal()
                },
                "buildFile",
            );
        }
    }

    #[test]
    fn test_build_file_extension_case_insensitive() {
        let config = PublishConfig::try_from(RawPublishConfig {
            build_file: Some(PathBuf::from("/tmp/App.APK")),
            ..minimal()
        })
        .unwrap();
        assert_eq!(config.build_file(), Path::new("/tmp/App.APK"));
    }

    #[test]
    fn test_duplicate_release_note_lang() {
        assert_config_error(
            RawPublishConfig {
                release_notes: Some(vec![
                    ReleaseNote {
                        lang: "ru-RU".to_string(),
                        file_path: PathBuf::from("a.txt"),
                    },
                    ReleaseNote {
                        lang: "ru-ru".to_string(),
                        file_path: PathBuf::from("b.txt"),
                    },
                ]),
                ..minimal()
            },
            "releaseNotes.lang",
        );
    }

    #[test]
    fn test_release_time_must_be_rfc3339() {
        assert_config_error(
            RawPublishConfig {
                release_time: Some("tomorrow".to_string()),
                ..minimal()
            },
            "releaseTime",
        );

        let config = PublishConfig::try_from(RawPublishConfig {
            release_time: Some("2026-01-01T10:00:00+03:00".to_string()),
            ..minimal()
        })
        .unwrap();
        assert_eq!(config.release_time(), Some("2026-01-01T10:00:00+03:00"));
    }

    #[test]
    fn test_merge_overlay_wins() {
        let base = RawPublishConfig {
            request_timeout: Some(100),
            publish_type: Some(PublishType::Manual),
            ..minimal()
        };
        let overlay = RawPublishConfig {
            request_timeout: Some(600),
            ..Default::default()
        };
        let merged = base.merge(overlay);
        assert_eq!(merged.request_timeout, Some(600));
        assert_eq!(merged.publish_type, Some(PublishType::Manual));
        assert_eq!(merged.application_id.as_deref(), Some("ru.example.app"));
    }

    #[test]
    fn test_deserialize_yaml() {
        let yaml = r#"
applicationId: ru.example.app
publishType: MANUAL
requestTimeout: 120
mobileServicesType: HMS
buildFormat: aab
releaseNotes:
  - lang: ru-RU
    filePath: notes/ru.txt
releasePhase:
  percent: 10.5
seoTags: [3, 1, 3]
"#;
        let raw: RawPublishConfig = serde_yaml::from_str(yaml).unwrap();
        let config = PublishConfig::try_from(raw).unwrap();
        assert_eq!(config.publish_type(), PublishType::Manual);
        assert_eq!(config.services_type(), ServicesType::Hms);
        assert_eq!(config.build_format(), BuildFormat::Aab);
        assert_eq!(config.request_timeout(), Duration::from_secs(120));
        assert_eq!(
            config.release_notes()[0].file_path,
            Path::new("./notes/ru.txt")
        );
        let ids: Vec<u16> = config.seo_tags().iter().map(SeoTag::id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: std::result::Result<RawPublishConfig, _> =
            serde_yaml::from_str("applicationId: ru.example.app\nbogus: 1\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("MANUAL".parse::<PublishType>().unwrap(), PublishType::Manual);
        assert_eq!("Hms".parse::<ServicesType>().unwrap(), ServicesType::Hms);
        assert_eq!("AAB".parse::<BuildFormat>().unwrap(), BuildFormat::Aab);
        assert!("delayed".parse::<PublishType>().is_err());
        assert_eq!(PublishType::Instantly.as_wire(), "INSTANTLY");
        assert_eq!(ServicesType::Unknown.as_wire(), "Unknown");
    }
}
