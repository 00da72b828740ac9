use std::fs;
use std::sync::OnceLock;

use chrono_tz::Tz;
use serde::Deserialize;

/// Global timezone setting for the application
static APP_TIMEZONE: OnceLock<Tz> = OnceLock::new();

/// Settings read from `dutyhub.toml`, each overridable from the
/// environment (`DATABASE_URL`, `BIND_ADDR`, `APP_TIMEZONE`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default)]
    pub bind_addr: Option<String>,
}

impl AppConfig {
    pub fn load() -> Self {
        let mut config = fs::read_to_string("dutyhub.toml")
            .ok()
            .and_then(|content| match toml::from_str::<AppConfig>(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    eprintln!("Warning: ignoring malformed dutyhub.toml: {}", e);
                    None
                }
            })
            .unwrap_or_default();

        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database_url = Some(url);
        }
        if let Ok(addr) = std::env::var("BIND_ADDR") {
            config.bind_addr = Some(addr);
        }
        if let Ok(tz) = std::env::var("APP_TIMEZONE") {
            config.timezone = Some(tz);
        }

        config
    }

    pub fn database_url(&self) -> String {
        self.database_url
            .clone()
            .unwrap_or_else(|| "sqlite:dutyhub.db?mode=rwc".to_string())
    }

    pub fn bind_addr(&self) -> String {
        self.bind_addr
            .clone()
            .unwrap_or_else(|| "0.0.0.0:3000".to_string())
    }
}

/// Initialize the timezone from the given string
pub fn init_timezone(tz_str: &str) {
    let timezone: Tz = tz_str.parse().unwrap_or_else(|_| {
        eprintln!("Warning: Invalid timezone '{}', falling back to UTC", tz_str);
        chrono_tz::UTC
    });

    if APP_TIMEZONE.set(timezone).is_err() {
        eprintln!("Warning: Timezone already initialized");
    }
}

/// Get the configured timezone
pub fn get_timezone() -> Tz {
    *APP_TIMEZONE.get().unwrap_or(&chrono_tz::UTC)
}
