use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,

    // APIs (opcional) - metadata vía YouTube Data API v3 cuando está presente
    pub youtube_api_key: Option<String>,

    // Comandos
    pub command_prefix: String,

    // Límites
    pub max_queue_size: usize,

    // Tiempos (en segundos)
    pub inactive_timeout: u64,
    pub presence_refresh: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord (obligatorio - sin token no hay bot)
            discord_token: std::env::var("DISCORD_TOKEN")
                .context("DISCORD_TOKEN no está definido en el entorno")?,

            youtube_api_key: std::env::var("YOUTUBE_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),

            command_prefix: std::env::var("COMMAND_PREFIX")
                .unwrap_or_else(|_| "!".to_string()),

            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,

            inactive_timeout: std::env::var("INACTIVE_TIMEOUT_SECS")
                .unwrap_or_else(|_| "300".to_string()) // 5 minutos
                .parse()?,

            presence_refresh: std::env::var("PRESENCE_REFRESH_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse()?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// Catches common mistakes before the client starts: an empty command
    /// prefix would match every message, and zero-valued limits or timers
    /// would disable queueing or disconnect the bot immediately.
    pub fn validate(&self) -> Result<()> {
        if self.command_prefix.is_empty() {
            anyhow::bail!("El prefijo de comandos no puede estar vacío");
        }

        if self.command_prefix.chars().any(char::is_whitespace) {
            anyhow::bail!(
                "El prefijo de comandos no puede contener espacios: {:?}",
                self.command_prefix
            );
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.inactive_timeout == 0 {
            anyhow::bail!("Inactive timeout must be greater than 0");
        }

        if self.presence_refresh == 0 {
            anyhow::bail!("Presence refresh interval must be greater than 0");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes sensitive values: the token is never printed and the API
    /// key is only reported as present or absent.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Prefijo: {:?}\n  \
            YouTube API key: {}\n  \
            Límites: {} canciones en cola\n  \
            Tiempos: {}s inactividad, {}s refresco de presencia",
            self.command_prefix,
            if self.youtube_api_key.is_some() {
                "configurada"
            } else {
                "no configurada (se usa yt-dlp)"
            },
            self.max_queue_size,
            self.inactive_timeout,
            self.presence_refresh,
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (sin default - debe proveerse)
            discord_token: String::new(),

            youtube_api_key: None,

            command_prefix: "!".to_string(),
            max_queue_size: 100,
            inactive_timeout: 300,
            presence_refresh: 15,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_empty_prefix_rejected() {
        let config = Config {
            command_prefix: String::new(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_whitespace_prefix_rejected() {
        let config = Config {
            command_prefix: "! ".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_limits_rejected() {
        let config = Config {
            max_queue_size: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            inactive_timeout: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_summary_excludes_token() {
        let config = Config {
            discord_token: "super-secreto".to_string(),
            ..Config::default()
        };
        assert!(!config.summary().contains("super-secreto"));
    }
}
