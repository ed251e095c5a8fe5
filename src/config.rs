//! Scan configuration
//!
//! [`ScanConfig`] is the raw, TOML-facing form. It is resolved and validated
//! into an immutable [`DetectorConfig`] (thresholds, enabled detectors,
//! severity policy) plus a [`ParserConfig`] before any scheduling starts.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::lang::Lang;
use crate::model::{DetectorId, Finding, Severity, ToolLevel};
use crate::walker::WalkOptions;

/// Default bridge call timeout
pub const DEFAULT_BRIDGE_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Thresholds
// ============================================================================

/// Resolved threshold set for one language
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Thresholds {
    pub max_function_lines: usize,
    pub max_complexity: usize,
    pub max_parameters: usize,
    pub max_nesting_depth: usize,
    pub max_type_members: usize,
    pub max_type_fields: usize,
    pub max_type_lines: usize,
    pub max_file_lines: usize,
    pub min_duplicate_statements: usize,
    pub require_public_docs: bool,
    pub allow_unwrap: bool,
    pub require_unsafe_comments: bool,
    pub max_clones_per_function: usize,
    pub allowed_magic_numbers: Vec<f64>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            max_function_lines: 25,
            max_complexity: 8,
            max_parameters: 4,
            max_nesting_depth: 3,
            max_type_members: 20,
            max_type_fields: 15,
            max_type_lines: 150,
            max_file_lines: 500,
            min_duplicate_statements: 6,
            require_public_docs: true,
            allow_unwrap: false,
            require_unsafe_comments: true,
            max_clones_per_function: 5,
            allowed_magic_numbers: vec![-1.0, 0.0, 1.0, 2.0, 10.0, 100.0, 1000.0],
        }
    }
}

impl Thresholds {
    pub fn is_allowed_number(&self, value: f64) -> bool {
        self.allowed_magic_numbers
            .iter()
            .any(|allowed| (allowed - value).abs() < f64::EPSILON)
    }

    fn validate(&self, scope: &str) -> Result<()> {
        let positive = [
            ("max_function_lines", self.max_function_lines),
            ("max_complexity", self.max_complexity),
            ("max_parameters", self.max_parameters),
            ("max_nesting_depth", self.max_nesting_depth),
            ("max_type_members", self.max_type_members),
            ("max_type_fields", self.max_type_fields),
            ("max_type_lines", self.max_type_lines),
            ("max_file_lines", self.max_file_lines),
            ("max_clones_per_function", self.max_clones_per_function),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(EngineError::invalid(format!(
                    "thresholds.{scope}.{name} must be positive"
                )));
            }
        }
        if self.min_duplicate_statements < 2 {
            return Err(EngineError::invalid(format!(
                "thresholds.{scope}.min_duplicate_statements must be at least 2"
            )));
        }
        Ok(())
    }
}

/// Partial threshold table as written in TOML; unset keys inherit
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThresholdOverrides {
    pub max_function_lines: Option<usize>,
    pub max_complexity: Option<usize>,
    pub max_parameters: Option<usize>,
    pub max_nesting_depth: Option<usize>,
    pub max_type_members: Option<usize>,
    pub max_type_fields: Option<usize>,
    pub max_type_lines: Option<usize>,
    pub max_file_lines: Option<usize>,
    pub min_duplicate_statements: Option<usize>,
    pub require_public_docs: Option<bool>,
    pub allow_unwrap: Option<bool>,
    pub require_unsafe_comments: Option<bool>,
    pub max_clones_per_function: Option<usize>,
    pub allowed_magic_numbers: Option<Vec<f64>>,
}

impl ThresholdOverrides {
    /// Overlay these values on top of `base`
    pub fn apply(&self, base: &Thresholds) -> Thresholds {
        Thresholds {
            max_function_lines: self.max_function_lines.unwrap_or(base.max_function_lines),
            max_complexity: self.max_complexity.unwrap_or(base.max_complexity),
            max_parameters: self.max_parameters.unwrap_or(base.max_parameters),
            max_nesting_depth: self.max_nesting_depth.unwrap_or(base.max_nesting_depth),
            max_type_members: self.max_type_members.unwrap_or(base.max_type_members),
            max_type_fields: self.max_type_fields.unwrap_or(base.max_type_fields),
            max_type_lines: self.max_type_lines.unwrap_or(base.max_type_lines),
            max_file_lines: self.max_file_lines.unwrap_or(base.max_file_lines),
            min_duplicate_statements: self
                .min_duplicate_statements
                .unwrap_or(base.min_duplicate_statements),
            require_public_docs: self.require_public_docs.unwrap_or(base.require_public_docs),
            allow_unwrap: self.allow_unwrap.unwrap_or(base.allow_unwrap),
            require_unsafe_comments: self
                .require_unsafe_comments
                .unwrap_or(base.require_unsafe_comments),
            max_clones_per_function: self
                .max_clones_per_function
                .unwrap_or(base.max_clones_per_function),
            allowed_magic_numbers: self
                .allowed_magic_numbers
                .clone()
                .unwrap_or_else(|| base.allowed_magic_numbers.clone()),
        }
    }
}

// ============================================================================
// Severity policy
// ============================================================================

/// Ratio bands mapping `metric / threshold` to a severity tier
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SeverityBands {
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for SeverityBands {
    fn default() -> Self {
        Self {
            medium: 1.5,
            high: 2.0,
            critical: 3.0,
        }
    }
}

impl SeverityBands {
    pub fn validate(&self) -> Result<()> {
        let all = [self.medium, self.high, self.critical];
        if all.iter().any(|b| !b.is_finite() || *b < 1.0) {
            return Err(EngineError::invalid(format!(
                "severity bands must be finite and >= 1.0, got {all:?}"
            )));
        }
        if !(self.medium < self.high && self.high < self.critical) {
            return Err(EngineError::invalid(format!(
                "severity bands must be strictly increasing, got {all:?}"
            )));
        }
        Ok(())
    }
}

/// Severity policy as written in TOML
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SeveritySection {
    pub bands: SeverityBands,
    /// Detector name -> base severity
    pub base: BTreeMap<String, Severity>,
    /// Detector name -> weight
    pub weights: BTreeMap<String, f64>,
    /// External tool level (`error`, `warning`, `info`) -> base severity
    pub tool_levels: BTreeMap<String, Severity>,
    /// Lint-code fragment -> base severity for tool warnings
    pub tool_rules: BTreeMap<String, Severity>,
}

fn default_base_severity(id: DetectorId) -> Severity {
    match id {
        DetectorId::TodoMarker
        | DetectorId::CommentedCode
        | DetectorId::MagicNumber
        | DetectorId::NamingConvention => Severity::Info,
        DetectorId::FunctionLength
        | DetectorId::ParameterCount
        | DetectorId::TypeSize
        | DetectorId::FileLength
        | DetectorId::MissingDocumentation
        | DetectorId::ExcessiveClone
        | DetectorId::ExternalTool => Severity::Low,
        DetectorId::CyclomaticComplexity
        | DetectorId::NestingDepth
        | DetectorId::DuplicateCode
        | DetectorId::UnwrapUsage => Severity::Medium,
        DetectorId::UnsafeCode => Severity::High,
    }
}

fn default_weight(id: DetectorId) -> f64 {
    match id {
        DetectorId::CyclomaticComplexity => 1.2,
        DetectorId::ParameterCount => 0.8,
        DetectorId::NestingDepth => 1.1,
        DetectorId::NamingConvention => 0.7,
        DetectorId::MissingDocumentation => 0.6,
        DetectorId::MagicNumber => 0.5,
        DetectorId::DuplicateCode => 1.3,
        _ => 1.0,
    }
}

/// Base severities for external tool findings that carry a level
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSeverityPolicy {
    pub levels: BTreeMap<ToolLevel, Severity>,
    /// Checked before `levels` for warnings; the rule code must contain the key
    pub warning_rules: BTreeMap<String, Severity>,
}

impl Default for ToolSeverityPolicy {
    fn default() -> Self {
        Self {
            levels: [
                (ToolLevel::Error, Severity::High),
                (ToolLevel::Warning, Severity::Medium),
                (ToolLevel::Info, Severity::Low),
            ]
            .into_iter()
            .collect(),
            warning_rules: [
                ("correctness", Severity::High),
                ("suspicious", Severity::Medium),
                ("complexity", Severity::Medium),
                ("perf", Severity::Medium),
                ("style", Severity::Low),
            ]
            .into_iter()
            .map(|(fragment, severity)| (fragment.to_string(), severity))
            .collect(),
        }
    }
}

impl ToolSeverityPolicy {
    pub fn base(&self, level: ToolLevel, rule: &str) -> Option<Severity> {
        if level == ToolLevel::Warning {
            let rule = rule.to_ascii_lowercase();
            let by_rule = self
                .warning_rules
                .iter()
                .find(|(fragment, _)| rule.contains(fragment.as_str()));
            if let Some((_, severity)) = by_rule {
                return Some(*severity);
            }
        }
        self.levels.get(&level).copied()
    }
}

fn parse_tool_level(name: &str) -> Result<ToolLevel> {
    match name {
        "error" => Ok(ToolLevel::Error),
        "warning" => Ok(ToolLevel::Warning),
        "info" => Ok(ToolLevel::Info),
        _ => Err(EngineError::invalid(format!(
            "severity.tool_levels: unknown level {name:?}"
        ))),
    }
}

// ============================================================================
// Detector configuration (resolved)
// ============================================================================

/// Immutable detector configuration shared by every worker of a scan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectorConfig {
    /// Enabled detectors, in registration order
    pub enabled: Vec<DetectorId>,
    pub default_thresholds: Thresholds,
    pub language_thresholds: BTreeMap<Lang, Thresholds>,
    pub bands: SeverityBands,
    pub base_severity: BTreeMap<DetectorId, Severity>,
    pub weights: BTreeMap<DetectorId, f64>,
    pub tool_severity: ToolSeverityPolicy,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        let all = DetectorId::BUILTIN
            .into_iter()
            .chain(std::iter::once(DetectorId::ExternalTool));
        Self {
            enabled: DetectorId::BUILTIN.to_vec(),
            default_thresholds: Thresholds::default(),
            language_thresholds: BTreeMap::new(),
            bands: SeverityBands::default(),
            base_severity: all.clone().map(|id| (id, default_base_severity(id))).collect(),
            weights: all.map(|id| (id, default_weight(id))).collect(),
            tool_severity: ToolSeverityPolicy::default(),
        }
    }
}

impl DetectorConfig {
    /// Thresholds in force for `lang`
    pub fn thresholds(&self, lang: Lang) -> &Thresholds {
        self.language_thresholds
            .get(&lang)
            .unwrap_or(&self.default_thresholds)
    }

    pub fn base_severity(&self, id: DetectorId) -> Severity {
        self.base_severity
            .get(&id)
            .copied()
            .unwrap_or_else(|| default_base_severity(id))
    }

    /// Base tier for one finding; tool findings with a level use the tool policy
    pub fn base_severity_for(&self, finding: &Finding) -> Severity {
        let by_level = match finding.tool_level {
            Some(level) if finding.detector == DetectorId::ExternalTool => {
                self.tool_severity.base(level, &finding.rule)
            }
            _ => None,
        };
        by_level.unwrap_or_else(|| self.base_severity(finding.detector))
    }

    pub fn weight(&self, id: DetectorId) -> f64 {
        self.weights.get(&id).copied().unwrap_or(1.0)
    }

    pub fn is_enabled(&self, id: DetectorId) -> bool {
        self.enabled.contains(&id)
    }

    /// Replace the threshold set for one language
    pub fn with_thresholds(mut self, lang: Lang, thresholds: Thresholds) -> Self {
        self.language_thresholds.insert(lang, thresholds);
        self
    }

    pub fn with_enabled(mut self, enabled: impl IntoIterator<Item = DetectorId>) -> Self {
        self.enabled = enabled.into_iter().collect();
        self
    }

    /// Sanity checks run before a scan is scheduled
    pub fn validate(&self) -> Result<()> {
        self.bands.validate()?;
        self.default_thresholds.validate("default")?;
        for (lang, thresholds) in &self.language_thresholds {
            thresholds.validate(lang.name())?;
        }
        for (id, weight) in &self.weights {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(EngineError::invalid(format!(
                    "severity weight for {id} must be a non-negative number"
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Parser configuration
// ============================================================================

/// Which backend parses a language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendChoice {
    Native,
    Bridged,
    Heuristic,
}

/// `[parsers.<lang>]` table
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParserSection {
    pub backend: Option<BackendChoice>,
    /// Bridge program and leading arguments
    pub command: Option<Vec<String>>,
    /// Feed the built-in helper script to the command (Python only)
    pub builtin_helper: Option<bool>,
    pub timeout_secs: Option<u64>,
}

/// Resolved bridge invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BridgeCommand {
    pub program: String,
    pub args: Vec<String>,
    pub builtin_helper: bool,
    pub timeout: Duration,
}

/// Resolved backend choice for one language
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum ParserSetting {
    Native,
    Bridged(BridgeCommand),
    Heuristic,
}

/// Per-language backend selection for one scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParserConfig {
    settings: BTreeMap<Lang, ParserSetting>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        let settings = Lang::ALL
            .into_iter()
            .map(|lang| (lang, Self::default_setting(lang)))
            .collect();
        Self { settings }
    }
}

impl ParserConfig {
    fn default_setting(lang: Lang) -> ParserSetting {
        match lang {
            Lang::Python => ParserSetting::Bridged(BridgeCommand {
                program: "python3".to_string(),
                args: Vec::new(),
                builtin_helper: true,
                timeout: DEFAULT_BRIDGE_TIMEOUT,
            }),
            _ => ParserSetting::Native,
        }
    }

    pub fn setting(&self, lang: Lang) -> ParserSetting {
        self.settings
            .get(&lang)
            .cloned()
            .unwrap_or_else(|| Self::default_setting(lang))
    }

    /// Override the backend for one language
    pub fn with_setting(mut self, lang: Lang, setting: ParserSetting) -> Self {
        self.settings.insert(lang, setting);
        self
    }

    /// Every language on the native parser, nothing bridged
    pub fn all_native() -> Self {
        Self {
            settings: Lang::ALL
                .into_iter()
                .map(|lang| (lang, ParserSetting::Native))
                .collect(),
        }
    }

    fn resolve(lang: Lang, section: &ParserSection) -> Result<ParserSetting> {
        let backend = section.backend.unwrap_or(match Self::default_setting(lang) {
            ParserSetting::Bridged(_) => BackendChoice::Bridged,
            _ => BackendChoice::Native,
        });
        match backend {
            BackendChoice::Native => Ok(ParserSetting::Native),
            BackendChoice::Heuristic => Ok(ParserSetting::Heuristic),
            BackendChoice::Bridged => {
                let command = match (&section.command, lang) {
                    (Some(cmd), _) => cmd.clone(),
                    (None, Lang::Python) => vec!["python3".to_string()],
                    (None, _) => {
                        return Err(EngineError::invalid(format!(
                            "parsers.{lang}: bridged backend needs a command"
                        )))
                    }
                };
                let Some((program, args)) = command.split_first() else {
                    return Err(EngineError::invalid(format!(
                        "parsers.{lang}.command must not be empty"
                    )));
                };
                let builtin_helper = section.builtin_helper.unwrap_or(lang == Lang::Python);
                if builtin_helper && lang != Lang::Python {
                    return Err(EngineError::invalid(format!(
                        "parsers.{lang}: the built-in helper only parses Python"
                    )));
                }
                Ok(ParserSetting::Bridged(BridgeCommand {
                    program: program.clone(),
                    args: args.to_vec(),
                    builtin_helper,
                    timeout: section
                        .timeout_secs
                        .map(Duration::from_secs)
                        .unwrap_or(DEFAULT_BRIDGE_TIMEOUT),
                }))
            }
        }
    }
}

// ============================================================================
// Walk settings
// ============================================================================

/// `[walk]` table
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct WalkSection {
    pub exclude: Vec<String>,
    pub include: Vec<String>,
    pub respect_gitignore: Option<bool>,
    pub include_hidden: Option<bool>,
    pub follow_symlinks: Option<bool>,
    pub max_file_size: Option<u64>,
    pub skip_test_files: Option<bool>,
    pub test_patterns: Vec<String>,
}

impl WalkSection {
    pub fn to_options(&self) -> WalkOptions {
        let defaults = WalkOptions::default();
        WalkOptions {
            exclude: if self.exclude.is_empty() {
                defaults.exclude
            } else {
                self.exclude.clone()
            },
            include: self.include.clone(),
            respect_gitignore: self.respect_gitignore.unwrap_or(defaults.respect_gitignore),
            include_hidden: self.include_hidden.unwrap_or(defaults.include_hidden),
            follow_symlinks: self.follow_symlinks.unwrap_or(defaults.follow_symlinks),
            max_file_size: self.max_file_size.unwrap_or(defaults.max_file_size),
            skip_test_files: self.skip_test_files.unwrap_or(defaults.skip_test_files),
            test_patterns: self.test_patterns.clone(),
        }
    }
}

// ============================================================================
// Raw TOML config
// ============================================================================

/// `[detectors]` table
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectorSection {
    /// Detector names in registration order; empty means all built-ins
    pub enabled: Vec<String>,
    pub disabled: Vec<String>,
}

/// The whole configuration file
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    pub detectors: DetectorSection,
    /// `default` plus per-language tables
    pub thresholds: BTreeMap<String, ThresholdOverrides>,
    pub severity: SeveritySection,
    pub parsers: BTreeMap<String, ParserSection>,
    pub walk: WalkSection,
}

impl ScanConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| EngineError::invalid(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text).map_err(|e| match e {
            EngineError::InvalidConfig { message } => {
                EngineError::invalid(format!("{}: {message}", path.display()))
            }
            other => other,
        })
    }

    /// Resolve and validate the detector half of the configuration
    pub fn detector_config(&self) -> Result<DetectorConfig> {
        let mut config = DetectorConfig::default();

        if !self.detectors.enabled.is_empty() {
            config.enabled = self
                .detectors
                .enabled
                .iter()
                .map(|name| parse_builtin(name))
                .collect::<Result<Vec<_>>>()?;
        }
        for name in &self.detectors.disabled {
            let id = parse_builtin(name)?;
            config.enabled.retain(|enabled| *enabled != id);
        }
        let mut seen = Vec::with_capacity(config.enabled.len());
        config.enabled.retain(|id| {
            let fresh = !seen.contains(id);
            seen.push(*id);
            fresh
        });

        if let Some(defaults) = self.thresholds.get("default") {
            config.default_thresholds = defaults.apply(&config.default_thresholds);
        }
        for (name, overrides) in &self.thresholds {
            if name == "default" {
                continue;
            }
            let lang: Lang = name
                .parse()
                .map_err(|e: String| EngineError::invalid(format!("thresholds.{name}: {e}")))?;
            config
                .language_thresholds
                .insert(lang, overrides.apply(&config.default_thresholds));
        }

        config.bands = self.severity.bands;
        for (name, severity) in &self.severity.base {
            config.base_severity.insert(parse_detector(name)?, *severity);
        }
        for (name, weight) in &self.severity.weights {
            config.weights.insert(parse_detector(name)?, *weight);
        }
        for (name, severity) in &self.severity.tool_levels {
            config
                .tool_severity
                .levels
                .insert(parse_tool_level(name)?, *severity);
        }
        for (fragment, severity) in &self.severity.tool_rules {
            config
                .tool_severity
                .warning_rules
                .insert(fragment.to_ascii_lowercase(), *severity);
        }

        config.validate()?;
        Ok(config)
    }

    /// Resolve the per-language parser backend table
    pub fn parser_config(&self) -> Result<ParserConfig> {
        let mut config = ParserConfig::default();
        for (name, section) in &self.parsers {
            let lang: Lang = name
                .parse()
                .map_err(|e: String| EngineError::invalid(format!("parsers.{name}: {e}")))?;
            config.settings.insert(lang, ParserConfig::resolve(lang, section)?);
        }
        Ok(config)
    }

    pub fn walk_options(&self) -> WalkOptions {
        self.walk.to_options()
    }
}

fn parse_detector(name: &str) -> Result<DetectorId> {
    name.parse().map_err(|_| EngineError::UnknownDetector {
        name: name.to_string(),
    })
}

/// Like [`parse_detector`], but only accepts detectors the registry can run
fn parse_builtin(name: &str) -> Result<DetectorId> {
    match parse_detector(name)? {
        DetectorId::ExternalTool => Err(EngineError::UnknownDetector {
            name: name.to_string(),
        }),
        id => Ok(id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = DetectorConfig::default();
        let t = config.thresholds(Lang::Rust);
        assert_eq!(t.max_function_lines, 25);
        assert_eq!(t.max_complexity, 8);
        assert_eq!(t.max_parameters, 4);
        assert_eq!(t.min_duplicate_statements, 6);
        assert_eq!(t.max_type_lines, 150);
        assert!(t.is_allowed_number(100.0));
        assert!(!t.is_allowed_number(42.0));
        assert_eq!(config.enabled.len(), DetectorId::BUILTIN.len());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_language_override_inherits_default_table() {
        let config = ScanConfig::from_toml_str(
            r#"
            [thresholds.default]
            max_function_lines = 30

            [thresholds.rust]
            max_complexity = 12
            "#,
        )
        .unwrap()
        .detector_config()
        .unwrap();

        assert_eq!(config.thresholds(Lang::Go).max_function_lines, 30);
        assert_eq!(config.thresholds(Lang::Rust).max_function_lines, 30);
        assert_eq!(config.thresholds(Lang::Rust).max_complexity, 12);
        assert_eq!(config.thresholds(Lang::Go).max_complexity, 8);
    }

    #[test]
    fn test_enabled_list_preserves_order() {
        let config = ScanConfig::from_toml_str(
            r#"
            [detectors]
            enabled = ["todo-marker", "function-length", "todo-marker"]
            "#,
        )
        .unwrap()
        .detector_config()
        .unwrap();
        assert_eq!(
            config.enabled,
            vec![DetectorId::TodoMarker, DetectorId::FunctionLength]
        );
    }

    #[test]
    fn test_unknown_detector_is_fatal() {
        let err = ScanConfig::from_toml_str(
            r#"
            [detectors]
            enabled = ["function-length", "spooky-action"]
            "#,
        )
        .unwrap()
        .detector_config()
        .unwrap_err();
        assert!(matches!(err, EngineError::UnknownDetector { ref name } if name == "spooky-action"));
    }

    #[test]
    fn test_non_monotonic_bands_rejected() {
        let err = ScanConfig::from_toml_str(
            r#"
            [severity.bands]
            medium = 2.0
            high = 1.5
            critical = 3.0
            "#,
        )
        .unwrap()
        .detector_config()
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig { .. }));

        let below_one = SeverityBands {
            medium: 0.5,
            high: 2.0,
            critical: 3.0,
        };
        assert!(below_one.validate().is_err());
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let err = ScanConfig::from_toml_str(
            r#"
            [thresholds.go]
            max_parameters = 0
            "#,
        )
        .unwrap()
        .detector_config()
        .unwrap_err();
        assert!(err.to_string().contains("max_parameters"));
    }

    #[test]
    fn test_unknown_language_in_overrides_rejected() {
        let config = ScanConfig::from_toml_str(
            r#"
            [thresholds.cobol]
            max_file_lines = 10
            "#,
        )
        .unwrap();
        assert!(config.detector_config().is_err());
    }

    #[test]
    fn test_parser_defaults_bridge_python() {
        let parsers = ScanConfig::default().parser_config().unwrap();
        assert_eq!(parsers.setting(Lang::Rust), ParserSetting::Native);
        match parsers.setting(Lang::Python) {
            ParserSetting::Bridged(cmd) => {
                assert_eq!(cmd.program, "python3");
                assert!(cmd.builtin_helper);
                assert_eq!(cmd.timeout, DEFAULT_BRIDGE_TIMEOUT);
            }
            other => panic!("expected bridged python, got {other:?}"),
        }
    }

    #[test]
    fn test_bridged_backend_without_command_rejected() {
        let config = ScanConfig::from_toml_str(
            r#"
            [parsers.go]
            backend = "bridged"
            "#,
        )
        .unwrap();
        assert!(config.parser_config().is_err());

        let config = ScanConfig::from_toml_str(
            r#"
            [parsers.python]
            backend = "heuristic"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.parser_config().unwrap().setting(Lang::Python),
            ParserSetting::Heuristic
        );
    }

    #[test]
    fn test_tool_levels_drive_base_severity() {
        use crate::model::Span;

        let tool_finding = |rule: &str, level: Option<ToolLevel>| {
            let mut f = Finding::new(
                DetectorId::ExternalTool,
                Path::new("src/lib.rs"),
                Lang::Rust,
                Span::lines(1, 1),
                "clippy: x",
            );
            f.rule = rule.to_string();
            f.tool_level = level;
            f
        };
        let config = DetectorConfig::default();
        let base = |rule: &str, level| config.base_severity_for(&tool_finding(rule, level));
        assert_eq!(base("clippy::absurd_extreme_comparisons", Some(ToolLevel::Error)), Severity::High);
        assert_eq!(base("clippy::needless_return", Some(ToolLevel::Warning)), Severity::Medium);
        assert_eq!(base("clippy::style_lint", Some(ToolLevel::Warning)), Severity::Low);
        assert_eq!(base("clippy::correctness_lint", Some(ToolLevel::Warning)), Severity::High);
        assert_eq!(base("clippy::style_lint", Some(ToolLevel::Error)), Severity::High);
        assert_eq!(base("clippy::x", Some(ToolLevel::Info)), Severity::Low);
        assert_eq!(base("clippy::x", None), Severity::Low);

        let config = ScanConfig::from_toml_str(
            r#"
            [severity.tool_levels]
            warning = "low"

            [severity.tool_rules]
            Needless = "info"
            "#,
        )
        .unwrap()
        .detector_config()
        .unwrap();
        let base = |rule: &str, level| config.base_severity_for(&tool_finding(rule, level));
        assert_eq!(base("clippy::needless_return", Some(ToolLevel::Warning)), Severity::Info);
        assert_eq!(base("clippy::redundant_clone", Some(ToolLevel::Warning)), Severity::Low);

        let err = ScanConfig::from_toml_str("[severity.tool_levels]\nfatal = \"high\"\n")
            .unwrap()
            .detector_config()
            .unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_walk_section_carries_test_patterns() {
        let config = ScanConfig::from_toml_str(
            r#"
            [walk]
            test_patterns = ["fixtures/", "*_spec.rb"]

            [thresholds.java]
            max_type_lines = 300
            "#,
        )
        .unwrap();
        let walk = config.walk_options();
        assert_eq!(walk.test_patterns, vec!["fixtures/", "*_spec.rb"]);
        assert!(walk.skip_test_files);
        assert_eq!(walk.exclude, WalkOptions::default().exclude);
        assert!(ScanConfig::default().walk_options().test_patterns.is_empty());

        let detectors = config.detector_config().unwrap();
        assert_eq!(detectors.thresholds(Lang::Java).max_type_lines, 300);
        assert_eq!(detectors.thresholds(Lang::Go).max_type_lines, 150);
    }

    #[test]
    fn test_malformed_toml_is_invalid_config() {
        let err = ScanConfig::from_toml_str("[detectors\nenabled = 3").unwrap_err();
        assert_eq!(format!("{:?}", err.exit_code()), format!("{:?}", std::process::ExitCode::from(2)));
    }
}
