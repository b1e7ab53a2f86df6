//! Engine-wide defaults.

use crate::attribute::AttributeFlags;
use crate::prerequisite::PrerequisiteOptions;

/// Environment variable enabling strict prerequisite evaluation.
pub const STRICT_PREREQUISITES_VAR: &str = "SAGA_STRICT_PREREQUISITES";

/// Defaults applied by hosts that do not build options per call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RulesConfig {
    /// Unsupported prerequisite types fail instead of contributing nothing.
    pub strict_prerequisites: bool,
    /// Attribute queries also read disabled items and effects.
    pub include_disabled: bool,
}

impl RulesConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read overrides from the environment. Unset or unparsable values keep
    /// the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(value) = std::env::var(STRICT_PREREQUISITES_VAR) {
            config.strict_prerequisites = parse_flag(&value).unwrap_or_else(|| {
                tracing::warn!(var = STRICT_PREREQUISITES_VAR, value = %value, "ignoring unrecognised flag value");
                false
            });
        }
        config
    }

    pub fn with_strict_prerequisites(mut self, strict: bool) -> Self {
        self.strict_prerequisites = strict;
        self
    }

    pub fn with_include_disabled(mut self, include: bool) -> Self {
        self.include_disabled = include;
        self
    }

    pub fn prerequisite_options<'o>(&self) -> PrerequisiteOptions<'o> {
        PrerequisiteOptions::new().with_strict(self.strict_prerequisites)
    }

    pub fn attribute_flags(&self) -> AttributeFlags {
        AttributeFlags {
            include_disabled: self.include_disabled,
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
