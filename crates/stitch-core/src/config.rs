//! Pipeline configuration

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use stitch_guardian::GuardianConfig;
use stitch_schema::DESIGN_VARIANT;

/// Largest fan-out a run supports (variant indices are one byte)
pub const MAX_VARIANTS: u32 = 255;

/// Per-run budgets and policy
///
/// Loadable from TOML; every key is optional.
///
/// ```toml
/// variant_count = 3
/// max_repair_attempts = 3
/// asset_root = "site/assets"
///
/// [guardian]
/// strict_components = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Concurrent variants generated in full mode
    pub variant_count: u32,
    /// Generator calls allowed per variant, first attempt included
    pub max_repair_attempts: u32,
    /// Autonomous patch passes allowed per artifact
    pub max_patch_attempts: u32,
    /// Timeout for a single generator call
    pub generator_timeout_secs: u64,
    /// Run the research step before fan-out
    pub research_enabled: bool,
    /// Schema generated payloads are validated against
    pub schema: String,
    /// Directory static assets must live under
    pub asset_root: PathBuf,
    /// Fail assembly when a referenced asset is absent on disk
    pub require_assets: bool,
    /// Security policy
    pub guardian: GuardianConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            variant_count: 5,
            max_repair_attempts: 3,
            max_patch_attempts: 2,
            generator_timeout_secs: 120,
            research_enabled: true,
            schema: DESIGN_VARIANT.to_string(),
            asset_root: PathBuf::from("assets"),
            require_assets: false,
            guardian: GuardianConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With variant count
    #[inline]
    #[must_use]
    pub fn with_variant_count(mut self, count: u32) -> Self {
        self.variant_count = count;
        self
    }

    /// With repair budget
    #[inline]
    #[must_use]
    pub fn with_max_repair_attempts(mut self, attempts: u32) -> Self {
        self.max_repair_attempts = attempts;
        self
    }

    /// With patch budget
    #[inline]
    #[must_use]
    pub fn with_max_patch_attempts(mut self, attempts: u32) -> Self {
        self.max_patch_attempts = attempts;
        self
    }

    /// With generator timeout
    #[inline]
    #[must_use]
    pub fn with_generator_timeout(mut self, timeout: Duration) -> Self {
        self.generator_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// With or without the research step
    #[inline]
    #[must_use]
    pub fn with_research(mut self, enabled: bool) -> Self {
        self.research_enabled = enabled;
        self
    }

    /// With schema id
    #[inline]
    #[must_use]
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// With asset root
    #[inline]
    #[must_use]
    pub fn with_asset_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.asset_root = root.into();
        self
    }

    /// With guardian policy
    #[inline]
    #[must_use]
    pub fn with_guardian(mut self, guardian: GuardianConfig) -> Self {
        self.guardian = guardian;
        self
    }

    /// Generator timeout as a duration
    #[inline]
    #[must_use]
    pub fn generator_timeout(&self) -> Duration {
        Duration::from_secs(self.generator_timeout_secs)
    }

    /// Parse and validate TOML
    ///
    /// # Errors
    /// Returns `PipelineError::Config` for malformed TOML or invalid values
    pub fn from_toml(content: &str) -> Result<Self, PipelineError> {
        let config: Self =
            toml::from_str(content).map_err(|e| PipelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    ///
    /// # Errors
    /// Returns `PipelineError::Config` if the file cannot be read or is invalid
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Check budgets and limits
    ///
    /// # Errors
    /// Returns `PipelineError::Config` naming the first bad value
    pub fn validate(&self) -> Result<(), PipelineError> {
        let bad = |msg: String| Err(PipelineError::Config(msg));
        if self.variant_count == 0 || self.variant_count > MAX_VARIANTS {
            return bad(format!(
                "variant_count must be in 1..={MAX_VARIANTS}, got {}",
                self.variant_count
            ));
        }
        if self.max_repair_attempts == 0 {
            return bad("max_repair_attempts must be at least 1".to_string());
        }
        if self.generator_timeout_secs == 0 {
            return bad("generator_timeout_secs must be at least 1".to_string());
        }
        if self.schema.trim().is_empty() {
            return bad("schema must not be empty".to_string());
        }
        if self.guardian.max_payload_bytes == 0 {
            return bad("guardian.max_payload_bytes must be at least 1".to_string());
        }
        if self.guardian.allowlist.is_empty() {
            return bad("guardian.allowlist must not be empty".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.variant_count, 5);
        assert_eq!(config.max_repair_attempts, 3);
        assert_eq!(config.max_patch_attempts, 2);
        assert_eq!(config.generator_timeout(), Duration::from_secs(120));
        assert!(config.research_enabled);
        assert_eq!(config.schema, "design_variant");
        assert_eq!(config.guardian.max_payload_bytes, 500_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml(
            r#"
            variant_count = 3
            asset_root = "site/assets"

            [guardian]
            strict_components = true
            extra_patterns = ["(?i)onmouse"]
            "#,
        )
        .unwrap();
        assert_eq!(config.variant_count, 3);
        assert_eq!(config.max_repair_attempts, 3);
        assert_eq!(config.asset_root, PathBuf::from("site/assets"));
        assert!(config.guardian.strict_components);
        assert_eq!(config.guardian.max_attribute_len, 2048);
    }

    #[test]
    fn out_of_range_values_rejected() {
        for config in [
            PipelineConfig::new().with_variant_count(0),
            PipelineConfig::new().with_variant_count(256),
            PipelineConfig::new().with_max_repair_attempts(0),
            PipelineConfig::new().with_schema(" "),
        ] {
            assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
        }
        assert!(PipelineConfig::from_toml("variant_count = -1").is_err());
        assert!(PipelineConfig::new().with_variant_count(255).validate().is_ok());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stitcher.toml");
        std::fs::write(&path, "research_enabled = false\n").unwrap();
        let config = PipelineConfig::load(&path).unwrap();
        assert!(!config.research_enabled);
        assert!(PipelineConfig::load(&dir.path().join("missing.toml")).is_err());
    }
}
