use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::extract::ExtractionMode;
use crate::fields;
use crate::source::SourceReliability;
use crate::{Error, Result};

/// Tunables for one reconciliation deployment.
///
/// Every field has a default, so a config file only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub reliability: SourceReliability,
    /// Minimum normalized similarity for two person names to count as the same value.
    pub name_threshold: f64,
    pub address_threshold: f64,
    pub pattern_boost: f64,
    pub catalog_boost: f64,
    /// Weight of a mandatory field in the overall confidence.
    pub mandatory_weight: f64,
    pub optional_weight: f64,
    /// Mandatory fields fused below this confidence send the record to review.
    pub min_mandatory_confidence: f64,
    pub default_mandatory: Vec<String>,
    /// Mandatory fields per record type, replacing `default_mandatory` when matched.
    pub record_types: BTreeMap<String, Vec<String>>,
    pub catalog_ttl_secs: u64,
    pub catalog_timeout_ms: u64,
    pub mode: ExtractionMode,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            reliability: SourceReliability::default(),
            name_threshold: 0.90,
            address_threshold: 0.85,
            pattern_boost: 1.10,
            catalog_boost: 1.15,
            mandatory_weight: 3.0,
            optional_weight: 1.0,
            min_mandatory_confidence: 0.5,
            default_mandatory: [
                fields::CASE_NUMBER,
                fields::OFFICE_NUMBER,
                fields::AUTHORITY,
                fields::REQUESTED_ACTION,
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
            record_types: BTreeMap::new(),
            catalog_ttl_secs: 24 * 60 * 60,
            catalog_timeout_ms: 2_000,
            mode: ExtractionMode::default(),
        }
    }
}

impl ReconcileConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load the user config if one exists, otherwise fall back to defaults.
    pub fn load_or_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("casefuse").join("config.toml"))
    }

    /// Apply `CASEFUSE_MODE` and `CASEFUSE_CATALOG_TTL_SECS`.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(mode) = std::env::var("CASEFUSE_MODE") {
            self.mode = mode.parse()?;
        }
        if let Ok(ttl) = std::env::var("CASEFUSE_CATALOG_TTL_SECS") {
            self.catalog_ttl_secs = ttl.trim().parse().map_err(|_| {
                Error::InvalidConfig(format!("CASEFUSE_CATALOG_TTL_SECS is not a number: {ttl}"))
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        self.reliability.validate()?;

        for (name, threshold) in [
            ("name_threshold", self.name_threshold),
            ("address_threshold", self.address_threshold),
        ] {
            if !threshold.is_finite() || threshold <= 0.0 || threshold > 1.0 {
                return Err(Error::InvalidConfig(format!(
                    "{name} must be within (0, 1], got {threshold}"
                )));
            }
        }

        for (name, boost) in [
            ("pattern_boost", self.pattern_boost),
            ("catalog_boost", self.catalog_boost),
        ] {
            if !boost.is_finite() || boost < 1.0 {
                return Err(Error::InvalidConfig(format!(
                    "{name} must be a finite value of at least 1.0, got {boost}"
                )));
            }
        }

        if !self.mandatory_weight.is_finite()
            || !self.optional_weight.is_finite()
            || self.optional_weight <= 0.0
            || self.mandatory_weight <= self.optional_weight
        {
            return Err(Error::InvalidConfig(format!(
                "mandatory_weight ({}) must exceed optional_weight ({}), both finite and positive",
                self.mandatory_weight, self.optional_weight
            )));
        }

        if !(0.0..=1.0).contains(&self.min_mandatory_confidence) {
            return Err(Error::InvalidConfig(format!(
                "min_mandatory_confidence must be within [0, 1], got {}",
                self.min_mandatory_confidence
            )));
        }

        if self.catalog_ttl_secs == 0 || self.catalog_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "catalog_ttl_secs and catalog_timeout_ms must be positive".into(),
            ));
        }

        Ok(())
    }

    /// Mandatory fields for a record type, falling back to the defaults.
    #[must_use]
    pub fn mandatory_fields(&self, record_type: Option<&str>) -> &[String] {
        record_type
            .and_then(|t| self.record_types.get(t))
            .unwrap_or(&self.default_mandatory)
    }

    #[must_use]
    pub const fn catalog_ttl(&self) -> Duration {
        Duration::from_secs(self.catalog_ttl_secs)
    }

    #[must_use]
    pub const fn catalog_timeout(&self) -> Duration {
        Duration::from_millis(self.catalog_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceKind;

    #[test]
    fn test_defaults_are_valid() {
        let config = ReconcileConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.catalog_ttl(), Duration::from_secs(86_400));
        assert_eq!(config.catalog_timeout(), Duration::from_secs(2));
        assert_eq!(config.mode, ExtractionMode::Complement);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ReconcileConfig::from_toml_str(
            r#"
            name_threshold = 0.92
            mode = "merge_all"

            [reliability]
            structured_markup = 0.95
            optical_scan = 0.6
            word_processor = 0.8

            [record_types]
            seizure = ["case_number", "account_number"]
            "#,
        )
        .unwrap();

        assert!((config.name_threshold - 0.92).abs() < f64::EPSILON);
        assert!((config.address_threshold - 0.85).abs() < f64::EPSILON);
        assert_eq!(config.mode, ExtractionMode::MergeAll);
        assert!((config.reliability.get(SourceKind::OpticalScan) - 0.6).abs() < f64::EPSILON);
        assert_eq!(
            config.mandatory_fields(Some("seizure")),
            ["case_number".to_string(), "account_number".to_string()]
        );
        assert_eq!(config.mandatory_fields(Some("unknown")).len(), 4);
        assert_eq!(config.mandatory_fields(None).len(), 4);
    }

    #[test]
    fn test_rejects_unknown_source_kind() {
        let err = ReconcileConfig::from_toml_str(
            r#"
            [reliability]
            structured_markup = 0.9
            fax = 0.5
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("fax"));
    }

    #[test]
    fn test_rejects_reliability_out_of_range() {
        let result = ReconcileConfig::from_toml_str(
            r#"
            [reliability]
            structured_markup = 1.4
            optical_scan = 0.7
            word_processor = 0.8
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_non_positive_threshold() {
        let err = ReconcileConfig::from_toml_str("name_threshold = 0.0").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_non_finite_values() {
        for toml in [
            "name_threshold = nan",
            "address_threshold = inf",
            "pattern_boost = nan",
            "catalog_boost = inf",
            "mandatory_weight = nan",
            "optional_weight = nan",
            "min_mandatory_confidence = nan",
        ] {
            let err = ReconcileConfig::from_toml_str(toml).unwrap_err();
            assert!(matches!(err, Error::InvalidConfig(_)), "{toml}");
        }

        let err = ReconcileConfig::from_toml_str(
            r#"
            [reliability]
            structured_markup = nan
            optical_scan = 0.7
            word_processor = 0.8
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("structured_markup"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "catalog_ttl_secs = 60\n").unwrap();

        let config = ReconcileConfig::load(&path).unwrap();
        assert_eq!(config.catalog_ttl(), Duration::from_secs(60));

        let missing = ReconcileConfig::load(&dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(Error::Io(_))));
    }
}
