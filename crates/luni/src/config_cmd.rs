// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `luni config` command implementation.

use luni_config::LuniConfig;
use luni_core::LuniError;

/// Render the effective configuration.
pub fn render_config(config: &LuniConfig, json: bool) -> Result<String, LuniError> {
    if json {
        return Ok(serde_json::to_string_pretty(config)?);
    }
    toml::to_string_pretty(config)
        .map_err(|e| LuniError::Config(format!("failed to render config as TOML: {e}")))
}

pub fn run_config(config: &LuniConfig, json: bool) -> Result<(), LuniError> {
    println!("{}", render_config(config, json)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_output_reloads() {
        let config = LuniConfig::default();
        let rendered = render_config(&config, false).unwrap();
        assert!(rendered.contains("[store]"));
        let reloaded = luni_config::load_and_validate_str(&rendered).unwrap();
        assert_eq!(reloaded.store.redis_url, config.store.redis_url);
        assert_eq!(reloaded.session.message_window, config.session.message_window);
    }

    #[test]
    fn json_output_names_sections() {
        let rendered = render_config(&LuniConfig::default(), true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["store"]["namespace"], "luni");
    }
}
