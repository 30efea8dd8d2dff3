//! CLI argument definitions for the Gravity server.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

/// Gravity - answers questions across indexed documents and live systems,
/// and proposes actions that run only after confirmation.
#[derive(Parser, Debug)]
#[command(name = "gravity", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// API server port.
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Directory of .md/.txt files indexed into the knowledge collection at startup.
    #[arg(short = 's', long = "seed-dir")]
    pub seed_dir: Option<PathBuf>,
}

impl CliArgs {
    /// Priority: --config flag > GRAVITY_CONFIG env var > ~/.gravity/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("GRAVITY_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Priority: --port flag > GRAVITY_PORT env var > config file value > 3040.
    pub fn resolve_port(&self, config_port: u16) -> u16 {
        if let Some(p) = self.port {
            return p;
        }
        if let Ok(val) = std::env::var("GRAVITY_PORT") {
            if let Ok(p) = val.parse::<u16>() {
                return p;
            }
        }
        if config_port != 0 {
            return config_port;
        }
        3040
    }

    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }
}

fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".gravity").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".gravity").join("config.toml");
    }
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_flags() {
        let args = CliArgs::parse_from([
            "gravity",
            "-c",
            "/tmp/g.toml",
            "--port",
            "4100",
            "-l",
            "debug",
            "--seed-dir",
            "docs",
        ]);
        assert_eq!(args.resolve_config_path(), PathBuf::from("/tmp/g.toml"));
        assert_eq!(args.resolve_port(3040), 4100);
        assert_eq!(args.resolve_log_level("info"), "debug");
        assert_eq!(args.seed_dir, Some(PathBuf::from("docs")));
    }

    #[test]
    fn test_log_level_falls_back_to_config() {
        let args = CliArgs::parse_from(["gravity"]);
        assert_eq!(args.resolve_log_level("warn"), "warn");
        assert!(args.seed_dir.is_none());
    }

    #[test]
    fn test_default_config_path_ends_with_gravity() {
        let path = default_config_path();
        assert!(path.ends_with("config.toml"));
    }
}
