use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::BotConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "soulxbot.toml",
    "soulxbot.yaml",
    "soulxbot.yml",
    "soulxbot.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<BotConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./soulxbot.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/soulxbot/soulxbot.{toml,yaml,yml,json}` (user-global)
///
/// Returns `BotConfig::default()` if no config file is found. A file that
/// exists but fails to parse is an error; silently running with defaults
/// would point the bot at the wrong database.
pub fn discover_and_load() -> anyhow::Result<BotConfig> {
    match find_config_file() {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config(&path)
        },
        None => {
            warn!("no config file found, using defaults");
            Ok(BotConfig::default())
        },
    }
}

/// Load `explicit` if given, otherwise discover.
pub fn load_or_discover(explicit: Option<&Path>) -> anyhow::Result<BotConfig> {
    match explicit {
        Some(path) => load_config(path),
        None => discover_and_load(),
    }
}

fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns `~/.config/soulxbot/` on all platforms.
pub fn config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().join(".config").join("soulxbot"))
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<BotConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::schema::Environment, secrecy::ExposeSecret};

    #[test]
    fn parses_toml_sections() {
        let raw = r#"
            [bot]
            username = "soulxbot"
            environment = "development"

            [twitch]
            client_id = "abc"
            client_secret = "shh"

            [vault]
            passphrase = "pass"

            [poller]
            interval_secs = 60
        "#;
        let cfg = parse_config(raw, Path::new("soulxbot.toml")).unwrap();
        assert_eq!(cfg.bot.environment, Environment::Development);
        assert_eq!(cfg.twitch.client_id, "abc");
        assert_eq!(
            cfg.twitch.client_secret.as_ref().unwrap().expose_secret(),
            "shh"
        );
        assert_eq!(cfg.vault.passphrase.as_ref().unwrap().expose_secret(), "pass");
        assert_eq!(cfg.poller.interval().as_secs(), 60);
        // untouched sections fall back to defaults
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.bot.command_prefix, '!');
        assert_eq!(cfg.vault.salt, soulxbot_vault::DEFAULT_SALT);
    }

    #[test]
    fn empty_file_uses_default_cadence() {
        let cfg = parse_config("", Path::new("soulxbot.toml")).unwrap();
        assert_eq!(cfg.poller.interval_secs, crate::DEFAULT_POLL_INTERVAL_SECS);
        assert_eq!(cfg.poller.interval().as_secs(), 300);
    }

    #[test]
    fn parses_yaml_and_json() {
        let yaml = "bot:\n  username: otherbot\nserver:\n  port: 9000\n";
        let cfg = parse_config(yaml, Path::new("soulxbot.yaml")).unwrap();
        assert_eq!(cfg.bot.username, "otherbot");
        assert_eq!(cfg.server.port, 9000);

        let json = r#"{"database": {"url": "sqlite::memory:"}}"#;
        let cfg = parse_config(json, Path::new("soulxbot.json")).unwrap();
        assert_eq!(cfg.database.url, "sqlite::memory:");
        assert!(cfg.bot.environment.is_production());
    }

    #[test]
    fn rejects_unknown_extension() {
        assert!(parse_config("", Path::new("soulxbot.ini")).is_err());
    }

    #[test]
    fn loads_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("soulxbot.toml");
        std::fs::write(&path, "[server]\nbind = \"127.0.0.1\"\n").unwrap();
        let cfg = load_or_discover(Some(&path)).unwrap();
        assert_eq!(cfg.server.bind, "127.0.0.1");
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_or_discover(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn zero_interval_is_clamped() {
        let cfg = parse_config("[poller]\ninterval_secs = 0\n", Path::new("a.toml")).unwrap();
        assert_eq!(cfg.poller.interval().as_secs(), 1);
    }
}
