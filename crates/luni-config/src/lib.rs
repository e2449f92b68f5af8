// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Luni state store.
//!
//! TOML files layered with environment overrides, strict unknown-key checks,
//! and miette diagnostics with typo suggestions.
//!
//! # Usage
//!
//! ```no_run
//! use luni_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("remote enabled: {}", config.store.use_redis);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

pub use diagnostic::{ConfigError, render_errors};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::LuniConfig;

/// Load configuration from the file hierarchy and environment, then validate it.
pub fn load_and_validate() -> Result<LuniConfig, Vec<ConfigError>> {
    match loader::load_config() {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => Err(diagnostic::figment_to_config_errors(
            err,
            &collect_toml_sources(),
        )),
    }
}

/// Load configuration from a TOML string and validate it.
pub fn load_and_validate_str(toml_content: &str) -> Result<LuniConfig, Vec<ConfigError>> {
    match loader::load_config_from_str(toml_content) {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => {
            let sources = vec![("<inline>".to_string(), toml_content.to_string())];
            Err(diagnostic::figment_to_config_errors(err, &sources))
        }
    }
}

/// Read the config files that exist, for source span resolution.
fn collect_toml_sources() -> Vec<(String, String)> {
    loader::config_paths()
        .into_iter()
        .filter_map(|path| {
            let content = std::fs::read_to_string(&path).ok()?;
            let display = std::fs::canonicalize(&path)
                .unwrap_or(path)
                .display()
                .to_string();
            Some((display, content))
        })
        .collect()
}
