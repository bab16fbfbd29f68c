use chrono_tz::Tz;
use std::{env, net::SocketAddr, path::PathBuf};

use crate::dispatch::PastDuePolicy;
use crate::error::ConfigError;

pub const DEFAULT_TZ: &str = "UTC";
pub const DEFAULT_COUNTER: u32 = 10;
pub const DEFAULT_BIND: &str = "0.0.0.0:8080";

/// Configuración del master, leída de variables de entorno:
/// - TZ: zona IANA para resolver due-specs y mostrar fechas (default UTC)
/// - COUNTER: `until` por defecto de la unidad de trabajo (default 10)
/// - PAST_DUE: `run` | `reject` (default run)
/// - MASTER_BIND: dirección de escucha (default 0.0.0.0:8080)
/// - STORE_PATH: si está, el store se persiste en ese archivo JSON
#[derive(Debug, Clone)]
pub struct Settings {
    pub timezone: Tz,
    pub default_counter: u32,
    pub past_due: PastDuePolicy,
    pub bind: SocketAddr,
    pub store_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            default_counter: DEFAULT_COUNTER,
            past_due: PastDuePolicy::RunNow,
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            store_path: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Igual que `from_env` pero con una fuente de variables inyectable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let tz_name = lookup("TZ").unwrap_or_else(|| DEFAULT_TZ.to_string());
        let timezone: Tz = tz_name
            .trim()
            .parse()
            .map_err(|_| ConfigError::UnknownTimezone {
                var: "TZ",
                value: tz_name.clone(),
            })?;

        let default_counter = match lookup("COUNTER") {
            Some(raw) => raw.trim().parse::<u32>().map_err(|e| ConfigError::Invalid {
                var: "COUNTER",
                value: raw.clone(),
                reason: e.to_string(),
            })?,
            None => DEFAULT_COUNTER,
        };

        let past_due = match lookup("PAST_DUE").as_deref().map(str::trim) {
            None | Some("run") => PastDuePolicy::RunNow,
            Some("reject") => PastDuePolicy::Reject,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "PAST_DUE",
                    value: other.to_string(),
                    reason: "se esperaba 'run' o 'reject'".to_string(),
                })
            }
        };

        let bind_raw = lookup("MASTER_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind: SocketAddr = bind_raw.trim().parse().map_err(|e: std::net::AddrParseError| {
            ConfigError::Invalid {
                var: "MASTER_BIND",
                value: bind_raw.clone(),
                reason: e.to_string(),
            }
        })?;

        let store_path = lookup("STORE_PATH")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            timezone,
            default_counter,
            past_due,
            bind,
            store_path,
        })
    }
}
