//! Configuration: schema structs, file loading, env-var overrides.

mod env_keys;
mod loader;
mod schema;

pub use env_keys::*;
pub use loader::{
    env_bool, env_optional, env_or, load, user_config_dir, ConfigError, PROJECT_CONFIG_NAME,
    USER_CONFIG_NAME,
};
pub use schema::{
    BindMountSpec, EnvProtectionConfig, GuardConfig, GuardLevelConfig, LoggingConfig,
    PolicyConfig, ProductionIndicators, SandboxSettings,
};

use anyhow::Context;

/// Default configuration rendered as YAML, for `init`.
pub fn render_default_yaml() -> anyhow::Result<String> {
    serde_yaml::to_string(&GuardConfig::default()).context("render default config as YAML")
}

/// Default configuration rendered as TOML, for `init --toml`.
pub fn render_default_toml() -> anyhow::Result<String> {
    toml::to_string_pretty(&GuardConfig::default()).context("render default config as TOML")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_renders_in_both_formats() {
        let yaml = render_default_yaml().unwrap();
        assert!(yaml.contains("sandbox"));
        let toml_text = render_default_toml().unwrap();
        assert!(toml_text.contains("[sandbox]"));
    }
}
