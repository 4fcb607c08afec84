//! Environment sanitizer: computes the variable view a sandboxed child is
//! allowed to see, applying the env-protection policy to the whitelist.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use vectra_guard_core::config::EnvProtectionConfig;
use vectra_guard_core::MaskingMode;

const FAKE_DEFAULT: &str = "vg-masked";

/// Compiled protection policy.
pub struct EnvSanitizer {
    enabled: bool,
    masking_mode: MaskingMode,
    protected: Option<GlobSet>,
    allow_read: Vec<String>,
    fake_values: std::collections::BTreeMap<String, String>,
}

impl EnvSanitizer {
    pub fn new(protection: &EnvProtectionConfig) -> Self {
        Self {
            enabled: protection.enabled,
            masking_mode: protection.masking_mode,
            protected: compile_protected(&protection.protected_vars),
            allow_read: protection.allow_read_vars.clone(),
            fake_values: protection.fake_values.clone(),
        }
    }

    /// Whether a variable name falls under protection.
    pub fn is_protected(&self, name: &str) -> bool {
        if !self.enabled || self.allow_read.iter().any(|v| v == name) {
            return false;
        }
        self.protected.as_ref().is_some_and(|set| set.is_match(name))
    }

    /// Resolve the whitelist against the parent environment: unset names are
    /// dropped, protected names are removed or faked per the masking mode.
    pub fn whitelist_env(&self, whitelist: &[String]) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for name in whitelist {
            let Ok(value) = std::env::var(name) else {
                continue;
            };
            if self.is_protected(name) {
                match self.masking_mode {
                    MaskingMode::Remove => continue,
                    MaskingMode::Fake => {
                        let fake = self
                            .fake_values
                            .get(name)
                            .cloned()
                            .unwrap_or_else(|| FAKE_DEFAULT.to_string());
                        pairs.push((name.clone(), fake));
                    }
                }
            } else {
                pairs.push((name.clone(), value));
            }
        }
        pairs
    }
}

fn compile_protected(patterns: &[String]) -> Option<GlobSet> {
    if patterns.is_empty() {
        return None;
    }
    let mut builder = GlobSetBuilder::new();
    let mut any = false;
    for pattern in patterns {
        match GlobBuilder::new(pattern).case_insensitive(true).build() {
            Ok(glob) => {
                builder.add(glob);
                any = true;
            }
            Err(e) => tracing::warn!("skipping invalid protected_vars pattern '{}': {}", pattern, e),
        }
    }
    if !any {
        return None;
    }
    builder.build().ok()
}
