use crate::error::{PresenceError, Result};
use crate::geofence;
use crate::paths;
use crate::types::{Actor, Site};
use crate::window;
use chrono::{FixedOffset, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// BiometricPolicy
// ---------------------------------------------------------------------------

/// What to do when an actor has no enrolled reference image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingReferencePolicy {
    /// Fail the gate without calling the verification service.
    #[default]
    Reject,
    /// Call the service without a reference; pass on a detected face.
    LivenessOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiometricPolicy {
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: u8,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub missing_reference: MissingReferencePolicy,
}

fn default_pass_threshold() -> u8 {
    70
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl Default for BiometricPolicy {
    fn default() -> Self {
        Self {
            pass_threshold: default_pass_threshold(),
            timeout_ms: default_timeout_ms(),
            missing_reference: MissingReferencePolicy::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// ShiftPolicy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftPolicy {
    /// Local wall-clock time (HH:MM) after which a first clock-in is late.
    #[serde(default = "default_shift_start")]
    pub start: String,
}

fn default_shift_start() -> String {
    "09:00".to_string()
}

impl Default for ShiftPolicy {
    fn default() -> Self {
        Self {
            start: default_shift_start(),
        }
    }
}

// ---------------------------------------------------------------------------
// PolicyConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub biometric: BiometricPolicy,
    #[serde(default)]
    pub shift: ShiftPolicy,
    /// How many biometric captures the org summary feed shows.
    #[serde(default = "default_capture_feed_limit")]
    pub capture_feed_limit: usize,
}

fn default_capture_feed_limit() -> usize {
    10
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            biometric: BiometricPolicy::default(),
            shift: ShiftPolicy::default(),
            capture_feed_limit: default_capture_feed_limit(),
        }
    }
}

// ---------------------------------------------------------------------------
// OrganizationConfig / VerificationConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationConfig {
    pub name: String,
    /// Fixed offset from UTC that defines the organization's calendar day.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationConfig {
    pub base_url: String,
    /// Name of the environment variable holding the bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub organization: OrganizationConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationConfig>,
    #[serde(default)]
    pub sites: Vec<Site>,
    #[serde(default)]
    pub roster: Vec<Actor>,
}

fn default_version() -> u32 {
    1
}

impl Config {
    pub fn new(org_name: impl Into<String>) -> Self {
        Self {
            version: 1,
            organization: OrganizationConfig {
                name: org_name.into(),
                utc_offset_minutes: 0,
            },
            policy: PolicyConfig::default(),
            verification: None,
            sites: Vec::new(),
            roster: Vec::new(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(PresenceError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn offset(&self) -> Result<FixedOffset> {
        window::offset_from_minutes(self.organization.utc_offset_minutes)
    }

    pub fn shift_start(&self) -> Result<NaiveTime> {
        window::parse_time_of_day(&self.policy.shift.start)
    }

    pub fn actor(&self, id: &str) -> Option<&Actor> {
        self.roster.iter().find(|a| a.id == id)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut error = |message: String| {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message,
            })
        };

        if self.policy.biometric.pass_threshold > 100 {
            error(format!(
                "policy.biometric.pass_threshold={} is above 100",
                self.policy.biometric.pass_threshold
            ));
        }
        if self.policy.biometric.timeout_ms == 0 {
            error("policy.biometric.timeout_ms must be greater than 0".to_string());
        }
        if let Err(e) = self.shift_start() {
            error(format!("policy.shift.start: {e}"));
        }
        if let Err(e) = self.offset() {
            error(format!("organization.utc_offset_minutes: {e}"));
        }

        let mut site_ids = HashSet::new();
        for site in &self.sites {
            if !site_ids.insert(site.id.as_str()) {
                error(format!("duplicate site id '{}'", site.id));
            }
            if let Err(e) = geofence::validate_coordinates(site.latitude, site.longitude) {
                error(format!("site '{}': {e}", site.id));
            }
        }

        let mut actor_ids = HashSet::new();
        for actor in &self.roster {
            if !actor_ids.insert(actor.id.as_str()) {
                error(format!("duplicate actor id '{}'", actor.id));
            }
        }

        for site in &self.sites {
            if site.radius_meters == 0 {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("site '{}' has a zero radius; nobody can clock there", site.id),
                });
            }
        }

        if !self.sites.iter().any(|s| s.active) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "no active sites configured".to_string(),
            });
        }

        if self.policy.biometric.missing_reference == MissingReferencePolicy::Reject {
            for actor in self.roster.iter().filter(|a| a.reference().is_none()) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!(
                        "actor '{}' has no reference_image or avatar and will always fail verification",
                        actor.id
                    ),
                });
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn site(id: &str) -> Site {
        Site {
            id: id.into(),
            name: id.to_uppercase(),
            address: None,
            latitude: -6.2,
            longitude: 106.8,
            radius_meters: 200,
            active: true,
        }
    }

    #[test]
    fn minimal_yaml_gets_policy_defaults() {
        let yaml = "organization:\n  name: acme\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.version, 1);
        assert_eq!(cfg.policy.biometric.pass_threshold, 70);
        assert_eq!(cfg.policy.biometric.timeout_ms, 10_000);
        assert_eq!(
            cfg.policy.biometric.missing_reference,
            MissingReferencePolicy::Reject
        );
        assert_eq!(cfg.policy.shift.start, "09:00");
        assert_eq!(cfg.policy.capture_feed_limit, 10);
        assert!(cfg.verification.is_none());
    }

    #[test]
    fn policy_overrides_parse() {
        let yaml = r#"
organization:
  name: acme
  utc_offset_minutes: 420
policy:
  biometric:
    pass_threshold: 85
    missing_reference: liveness_only
  shift:
    start: "08:30"
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.policy.biometric.pass_threshold, 85);
        assert_eq!(
            cfg.policy.biometric.missing_reference,
            MissingReferencePolicy::LivenessOnly
        );
        assert_eq!(
            cfg.shift_start().unwrap(),
            NaiveTime::from_hms_opt(8, 30, 0).unwrap()
        );
        assert_eq!(cfg.offset().unwrap().local_minus_utc(), 420 * 60);
    }

    #[test]
    fn save_then_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::new("acme");
        cfg.sites.push(site("hq"));
        cfg.save(dir.path()).unwrap();

        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn load_without_file_is_not_initialized() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Config::load(dir.path()),
            Err(PresenceError::NotInitialized)
        ));
    }

    #[test]
    fn validate_flags_duplicates_and_bad_policy() {
        let mut cfg = Config::new("acme");
        cfg.sites = vec![site("hq"), site("hq")];
        cfg.policy.biometric.pass_threshold = 120;
        cfg.policy.shift.start = "nine".into();

        let warnings = cfg.validate();
        let errors: Vec<_> = warnings
            .iter()
            .filter(|w| w.level == WarnLevel::Error)
            .map(|w| w.message.as_str())
            .collect();
        assert!(errors.iter().any(|m| m.contains("duplicate site id 'hq'")));
        assert!(errors.iter().any(|m| m.contains("pass_threshold")));
        assert!(errors.iter().any(|m| m.contains("policy.shift.start")));
    }

    #[test]
    fn validate_warns_on_actor_without_reference() {
        let mut cfg = Config::new("acme");
        cfg.sites.push(site("hq"));
        cfg.roster.push(Actor {
            id: "alice".into(),
            name: "Alice".into(),
            department: None,
            reference_image: None,
            avatar: None,
        });
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Warning && w.message.contains("alice")));

        cfg.roster[0].avatar =
            Some(crate::types::ImageRef::new("https://photos.example/alice-avatar.jpg"));
        assert!(!cfg.validate().iter().any(|w| w.message.contains("alice")));
    }
}
