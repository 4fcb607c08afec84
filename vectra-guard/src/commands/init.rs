//! `init`: write a default config file at the project root.

use anyhow::{bail, Result};
use std::path::Path;
use vectra_guard_core::config;

pub fn cmd_init(force: bool, toml: bool) -> Result<i32> {
    let (name, content) = if toml {
        ("vectra-guard.toml", config::render_default_toml()?)
    } else {
        (config::PROJECT_CONFIG_NAME, config::render_default_yaml()?)
    };
    let path = Path::new(name);
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", name);
    }
    std::fs::write(path, content)?;
    println!("Wrote {}", name);
    Ok(0)
}
