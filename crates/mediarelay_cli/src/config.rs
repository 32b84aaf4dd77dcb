use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use mediarelay_bridge::telegram::DEFAULT_BOT_API_URL;
use mediarelay_bridge::TelegramConfig;
use mediarelay_storage::{R2Config, StagingConfig};
use serde::Deserialize;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_TIMEOUT_SECS: u64 = 600;
const DEFAULT_MAX_FILE_BYTES: u64 = 2 * 1024 * 1024 * 1024;
const POLL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub api_id: Option<String>,
    pub api_hash: Option<String>,
    pub bot_token: Option<String>,
    pub bot_api_url: Option<String>,
    pub r2_account_id: Option<String>,
    pub r2_access_key: Option<String>,
    pub r2_secret_key: Option<String>,
    pub r2_bucket_name: Option<String>,
    pub r2_public_domain: Option<String>,
    pub web_app_url: Option<String>,
    pub port: Option<u16>,
    pub staging_dir: Option<PathBuf>,
    pub fetch_timeout_secs: Option<u64>,
    pub upload_timeout_secs: Option<u64>,
    pub max_file_bytes: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub telegram: TelegramConfig,
    pub r2: R2Config,
    pub web_app_url: String,
    pub port: u16,
    pub staging: StagingConfig,
    pub upload_timeout: Duration,
    pub api_credentials: bool,
}

impl RuntimeConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(path) => {
                let source = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                Self::from_toml_str(&source)
                    .with_context(|| format!("invalid config TOML at {}", path.display()))?
            }
            None => Self::default(),
        };
        base.overlay(|key| std::env::var(key).ok())
    }

    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    pub fn overlay<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        overlay_string(&mut self.api_id, lookup("API_ID"));
        overlay_string(&mut self.api_hash, lookup("API_HASH"));
        overlay_string(&mut self.bot_token, lookup("BOT_TOKEN"));
        overlay_string(&mut self.bot_api_url, lookup("BOT_API_URL"));
        overlay_string(&mut self.r2_account_id, lookup("R2_ACCOUNT_ID"));
        overlay_string(&mut self.r2_access_key, lookup("R2_ACCESS_KEY"));
        overlay_string(&mut self.r2_secret_key, lookup("R2_SECRET_KEY"));
        overlay_string(&mut self.r2_bucket_name, lookup("R2_BUCKET_NAME"));
        overlay_string(&mut self.r2_public_domain, lookup("R2_PUBLIC_DOMAIN"));
        overlay_string(&mut self.web_app_url, lookup("WEB_APP_URL"));
        overlay_parsed(&mut self.port, "PORT", lookup("PORT"))?;
        if let Some(dir) = lookup("STAGING_DIR") {
            self.staging_dir = Some(PathBuf::from(dir));
        }
        overlay_parsed(
            &mut self.fetch_timeout_secs,
            "FETCH_TIMEOUT_SECS",
            lookup("FETCH_TIMEOUT_SECS"),
        )?;
        overlay_parsed(
            &mut self.upload_timeout_secs,
            "UPLOAD_TIMEOUT_SECS",
            lookup("UPLOAD_TIMEOUT_SECS"),
        )?;
        overlay_parsed(
            &mut self.max_file_bytes,
            "MAX_FILE_BYTES",
            lookup("MAX_FILE_BYTES"),
        )?;
        Ok(self)
    }

    pub fn resolve(self) -> Result<Settings> {
        let telegram = TelegramConfig {
            api_url: self
                .bot_api_url
                .unwrap_or_else(|| DEFAULT_BOT_API_URL.to_string()),
            bot_token: required(self.bot_token, "BOT_TOKEN")?,
            poll_timeout: POLL_TIMEOUT,
        };

        let r2 = R2Config {
            account_id: required(self.r2_account_id, "R2_ACCOUNT_ID")?,
            access_key: required(self.r2_access_key, "R2_ACCESS_KEY")?,
            secret_key: required(self.r2_secret_key, "R2_SECRET_KEY")?,
            bucket: required(self.r2_bucket_name, "R2_BUCKET_NAME")?,
            public_domain: required(self.r2_public_domain, "R2_PUBLIC_DOMAIN")?,
        };

        let staging = StagingConfig {
            root: self
                .staging_dir
                .unwrap_or_else(|| std::env::temp_dir().join("mediarelay")),
            max_bytes: self.max_file_bytes.unwrap_or(DEFAULT_MAX_FILE_BYTES),
            fetch_timeout: Duration::from_secs(
                self.fetch_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
        };

        Ok(Settings {
            telegram,
            r2,
            web_app_url: required(self.web_app_url, "WEB_APP_URL")?,
            port: self.port.unwrap_or(DEFAULT_PORT),
            staging,
            upload_timeout: Duration::from_secs(
                self.upload_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            api_credentials: self.api_id.is_some() && self.api_hash.is_some(),
        })
    }
}

fn overlay_string(field: &mut Option<String>, value: Option<String>) {
    if let Some(value) = value {
        *field = Some(value);
    }
}

fn overlay_parsed<T>(field: &mut Option<T>, key: &str, value: Option<String>) -> Result<()>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Some(raw) = value {
        let parsed = raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has invalid value {raw:?}"))?;
        *field = Some(parsed);
    }
    Ok(())
}

fn required(value: Option<String>, key: &str) -> Result<String> {
    value
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| anyhow!("missing required setting {key}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn complete_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("BOT_TOKEN", "123:abc"),
            ("R2_ACCOUNT_ID", "acct"),
            ("R2_ACCESS_KEY", "access"),
            ("R2_SECRET_KEY", "secret"),
            ("R2_BUCKET_NAME", "videos"),
            ("R2_PUBLIC_DOMAIN", "https://pub.example.r2.dev"),
            ("WEB_APP_URL", "https://watch.example"),
        ])
    }

    fn lookup<'a>(env: &'a HashMap<&'static str, &'static str>) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| env.get(key).map(|value| value.to_string())
    }

    #[test]
    fn environment_alone_resolves_with_defaults() {
        let env = complete_env();
        let settings = RuntimeConfig::default()
            .overlay(lookup(&env))
            .expect("overlay")
            .resolve()
            .expect("resolve");

        assert_eq!(settings.port, DEFAULT_PORT);
        assert_eq!(settings.telegram.api_url, DEFAULT_BOT_API_URL);
        assert_eq!(settings.r2.bucket, "videos");
        assert_eq!(settings.web_app_url, "https://watch.example");
        assert_eq!(settings.upload_timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(settings.staging.max_bytes, DEFAULT_MAX_FILE_BYTES);
        assert!(!settings.api_credentials);
    }

    #[test]
    fn environment_overrides_file_values() {
        let file = RuntimeConfig::from_toml_str(
            r#"
            port = 9000
            web_app_url = "https://from-file.example"
            r2_bucket_name = "file-bucket"
            fetch_timeout_secs = 30
            "#,
        )
        .expect("toml");

        let mut env = complete_env();
        env.insert("PORT", "9100");
        env.remove("R2_BUCKET_NAME");
        env.insert("WEB_APP_URL", "");

        let settings = file
            .overlay(lookup(&env))
            .expect("overlay")
            .resolve()
            .expect("resolve");
        assert_eq!(settings.port, 9100);
        assert_eq!(settings.r2.bucket, "file-bucket");
        assert_eq!(settings.web_app_url, "https://from-file.example");
        assert_eq!(settings.staging.fetch_timeout, Duration::from_secs(30));
    }

    #[test]
    fn missing_required_setting_is_named() {
        let mut env = complete_env();
        env.remove("R2_PUBLIC_DOMAIN");

        let err = RuntimeConfig::default()
            .overlay(lookup(&env))
            .expect("overlay")
            .resolve()
            .expect_err("missing domain");
        assert!(err.to_string().contains("R2_PUBLIC_DOMAIN"));
    }

    #[test]
    fn malformed_port_is_rejected() {
        let mut env = complete_env();
        env.insert("PORT", "eighty");

        let err = RuntimeConfig::default()
            .overlay(lookup(&env))
            .expect_err("bad port");
        assert!(err.to_string().contains("PORT"));
    }
}
