use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

const DEV_SECRET: &str = "dev-secret-change-me";

pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub upload_dir: PathBuf,
    pub jwt_secret: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let allow_dev = env::var("STRIDE_ALLOW_DEV_SECRET").is_ok_and(|v| v == "1");
        let jwt_secret = check_secret(env::var("STRIDE_JWT_SECRET").ok(), allow_dev)?;

        Ok(Self {
            host: try_load("STRIDE_HOST", "0.0.0.0")?,
            port: try_load("STRIDE_PORT", "3000")?,
            db_path: try_load("STRIDE_DB_PATH", "stride.db")?,
            upload_dir: try_load("STRIDE_UPLOAD_DIR", "./uploads")?,
            jwt_secret,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    raw.parse()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("invalid {key} value: {raw}"))
}

/// The token signing secret; unset or placeholder values only pass with `allow_dev`.
fn check_secret(secret: Option<String>, allow_dev: bool) -> Result<String> {
    let secret = secret.map(|s| s.trim().to_string()).unwrap_or_default();
    let unusable = secret.is_empty() || PLACEHOLDER_SECRETS.contains(&secret.as_str());

    match (unusable, allow_dev) {
        (false, _) => Ok(secret),
        (true, true) => {
            warn!("STRIDE_JWT_SECRET is unset or a placeholder; tokens are NOT secure");
            Ok(if secret.is_empty() { DEV_SECRET.to_string() } else { secret })
        }
        (true, false) => bail!(
            "STRIDE_JWT_SECRET is unset or still a placeholder. \
             Set it in your .env file, or STRIDE_ALLOW_DEV_SECRET=1 for local development."
        ),
    }
}
