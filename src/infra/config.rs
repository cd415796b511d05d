use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cli::{AppContext, InitArgs};

#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    /// Ignore patterns applied on top of .gitignore when walking
    pub ignore_patterns: Vec<String>,

    /// Map computation defaults
    pub map: MapConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MapConfig {
    /// Default token budget for the rendered map
    pub max_tokens: usize,

    /// Tokenizer model or encoding name
    pub model: String,

    /// Lines of context around each rendered definition
    pub context_lines: usize,

    /// Result-cache refresh policy: always | files | auto | manual
    pub refresh: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ignore_patterns: vec![
                "target/".to_string(),
                "node_modules/".to_string(),
                "dist/".to_string(),
                "build/".to_string(),
                ".git/".to_string(),
                "*.pyc".to_string(),
                "__pycache__/".to_string(),
                ".DS_Store".to_string(),
            ],
            map: MapConfig {
                max_tokens: 1024,
                model: "gpt-4o".to_string(),
                context_lines: 3,
                refresh: "auto".to_string(),
            },
        }
    }
}

pub fn load_config() -> Result<Config> {
    // Defaults are the base layer, so a repository without any
    // repomap.toml still gets a working configuration.
    let mut builder = config::Config::builder().add_source(
        config::Config::try_from(&Config::default())
            .context("Failed to encode default configuration")?,
    );

    // Load from config files in priority order
    let config_paths = ["repomap.toml", ".repomap.toml"];

    for path in &config_paths {
        if Path::new(path).exists() {
            builder = builder.add_source(config::File::with_name(path));
            break;
        }
    }

    // Add environment variables with REPOMAP_ prefix
    builder = builder.add_source(config::Environment::with_prefix("REPOMAP").separator("_"));

    let cfg = builder.build().context("Failed to load configuration")?;
    let parsed: Config = cfg
        .try_deserialize()
        .context("Failed to parse configuration")?;

    Ok(parsed)
}

pub fn init(args: InitArgs, ctx: &AppContext) -> Result<()> {
    let config_path = args.path.join("repomap.toml");

    if config_path.exists() && !args.force {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    let config = Config::default();
    let toml_string =
        toml::to_string_pretty(&config).context("Failed to serialize default config")?;

    std::fs::write(&config_path, toml_string).context("Failed to write config file")?;

    if !ctx.quiet {
        println!("Created config file at {}", config_path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert_eq!(cfg.map.max_tokens, 1024);
        assert_eq!(cfg.map.refresh, "auto");
        assert!(cfg.ignore_patterns.iter().any(|p| p == "target/"));
    }

    #[test]
    fn load_config_without_file_uses_defaults() {
        // The crate root carries no repomap.toml, so only the layered
        // defaults apply; a missing config file must never be an error.
        let cfg = load_config().expect("defaults should always load");
        let defaults = Config::default();

        assert_eq!(cfg.map.max_tokens, defaults.map.max_tokens);
        assert_eq!(cfg.map.model, defaults.map.model);
        assert_eq!(cfg.map.refresh, defaults.map.refresh);
        assert_eq!(cfg.ignore_patterns, defaults.ignore_patterns);
    }
}
