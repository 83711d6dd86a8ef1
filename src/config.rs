use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {key}")]
    Invalid { key: String, value: String },
    #[error("MAX_BOXES must be at least 1")]
    NoBoxes,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub listen_addr: IpAddr,
    pub port: u16,
    pub max_boxes: usize,
    pub languages_dir: PathBuf,
    pub box_data_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub isolate_bin: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Config {
            listen_addr: parse(&lookup, "LISTEN_ADDR", IpAddr::from([0, 0, 0, 0]))?,
            port: parse(&lookup, "PORT", 8080)?,
            max_boxes: parse(&lookup, "MAX_BOXES", 5)?,
            languages_dir: lookup("LANGUAGES_DIR")
                .unwrap_or_else(|| "/app/scripts/languages".to_string())
                .into(),
            box_data_dir: lookup("BOX_DATA_DIR")
                .unwrap_or_else(|| "/box_data".to_string())
                .into(),
            scratch_dir: lookup("SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            isolate_bin: lookup("ISOLATE_BIN")
                .unwrap_or_else(|| "isolate".to_string())
                .into(),
        };

        if config.max_boxes == 0 {
            return Err(ConfigError::NoBoxes);
        }
        Ok(config)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_addr, self.port)
    }
}

fn parse<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            value,
        }),
    }
}
