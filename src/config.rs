use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use serde::Deserialize;

const BOT_CONFIG_FILE_ENV: &str = "BOT_CONFIG_FILE";
const DEFAULT_BOT_CONFIG_FILE: &str = "/etc/zivpn/bot-config.json";

/// Contents of the bot config file.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfigFile {
    pub bot_token: String,
    pub admin_id: i64,
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    pub key_file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct PaymentSettings {
    pub base_url: String,
    pub project: String,
    pub api_key: String,
    pub method: String,
}

#[derive(Debug, Clone, Copy)]
pub struct Pricing {
    pub price_per_day: u64,
    pub min_days: u32,
    pub trial_days: u32,
}

impl Pricing {
    /// `None` when the total does not fit.
    pub fn amount_for(&self, days: u32) -> Option<u64> {
        u64::from(days).checked_mul(self.price_per_day)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollSettings {
    /// Longest time a buyer is given to pay. `None` on overflow.
    pub fn budget(&self) -> Option<Duration> {
        self.interval.checked_mul(self.max_attempts)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MaintenanceSettings {
    pub sweep_interval: Duration,
    pub backup_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub admin_id: i64,
    pub api: ApiSettings,
    pub payment: PaymentSettings,
    pub pricing: Pricing,
    pub polling: PollSettings,
    pub maintenance: MaintenanceSettings,
    pub trial_db_file: PathBuf,
    pub backup_dir: PathBuf,
    pub order_prefix: String,
}

impl Config {
    /// Reads the bot config file and the environment.
    pub fn load() -> Result<Self> {
        let path = env::var(BOT_CONFIG_FILE_ENV).unwrap_or_else(|_| DEFAULT_BOT_CONFIG_FILE.into());
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read bot config {}", path))?;
        let file: BotConfigFile = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse bot config {}", path))?;

        Self::from_env(file)
    }

    pub fn from_env(file: BotConfigFile) -> Result<Self> {
        Self::from_lookup(file, |key| env::var(key).ok())
    }

    /// Builds the config from `lookup`, then validates it.
    pub fn from_lookup(file: BotConfigFile, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let setting = Settings { lookup };
        let config = Config {
            bot_token: file.bot_token,
            admin_id: file.admin_id,
            api: ApiSettings {
                base_url: setting.or("API_URL", "http://127.0.0.1:8080/api".to_string())?,
                key_file: setting.or("API_KEY_FILE", PathBuf::from("/etc/zivpn/apikey"))?,
            },
            payment: PaymentSettings {
                base_url: setting.or("PAKASIR_BASE_URL", "https://app.pakasir.com/api".to_string())?,
                project: setting.or("PAKASIR_PROJECT", String::new())?,
                api_key: setting.or("PAKASIR_API_KEY", String::new())?,
                method: setting.or("PAKASIR_METHOD", "qris".to_string())?,
            },
            pricing: Pricing {
                price_per_day: setting.or("PRICE_PER_DAY", 1000)?,
                min_days: setting.or("MIN_DAYS_PURCHASE", 7)?,
                trial_days: setting.or("TRIAL_DAYS", 1)?,
            },
            polling: PollSettings {
                interval: Duration::from_secs(setting.or("POLL_INTERVAL_SECS", 5)?),
                max_attempts: setting.or("POLL_MAX_ATTEMPTS", 60)?,
            },
            maintenance: MaintenanceSettings {
                sweep_interval: Duration::from_secs(setting.or("AUTO_DELETE_INTERVAL_SECS", 30)?),
                backup_interval: Duration::from_secs(setting.or("AUTO_BACKUP_INTERVAL_SECS", 3 * 60 * 60)?),
            },
            trial_db_file: setting.or("TRIAL_DB_FILE", PathBuf::from("/etc/zivpn/trial_users.db"))?,
            backup_dir: setting.or("BACKUP_DIR", PathBuf::from("/etc/zivpn/backups"))?,
            order_prefix: setting.or("ORDER_PREFIX", "VPN".to_string())?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        ensure!(!self.polling.interval.is_zero(), "POLL_INTERVAL_SECS must be at least 1");
        ensure!(self.polling.max_attempts >= 1, "POLL_MAX_ATTEMPTS must be at least 1");
        ensure!(self.pricing.min_days >= 1, "MIN_DAYS_PURCHASE must be at least 1");
        ensure!(self.pricing.trial_days >= 1, "TRIAL_DAYS must be at least 1");
        ensure!(
            !self.maintenance.sweep_interval.is_zero(),
            "AUTO_DELETE_INTERVAL_SECS must be at least 1"
        );
        ensure!(
            !self.maintenance.backup_interval.is_zero(),
            "AUTO_BACKUP_INTERVAL_SECS must be at least 1"
        );

        let budget = self
            .polling
            .budget()
            .context("POLL_INTERVAL_SECS x POLL_MAX_ATTEMPTS overflows")?;
        chrono::Duration::from_std(budget).context("payment window is too long")?;
        Ok(())
    }
}

/// Reads the API key file, trimming whitespace. A missing file means no key.
pub fn read_api_key(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(key) => Some(key.trim().to_string()).filter(|key| !key.is_empty()),
        Err(e) => {
            log::warn!("API key file {} unreadable: {}", path.display(), e);
            None
        }
    }
}

struct Settings<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Settings<F> {
    fn or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match (self.lookup)(key) {
            Some(value) => parse_setting(key, &value),
            None => Ok(default),
        }
    }
}

fn parse_setting<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("invalid value for {}: {:?}", key, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn parse_setting_rejects_garbage() {
        assert_eq!(parse_setting::<u32>("MIN_DAYS_PURCHASE", " 7 ").unwrap(), 7);
        let err = parse_setting::<u32>("MIN_DAYS_PURCHASE", "seven").unwrap_err();
        assert!(err.to_string().contains("MIN_DAYS_PURCHASE"));
    }

    #[test]
    fn pricing_is_per_day() {
        let pricing = Pricing {
            price_per_day: 1000,
            min_days: 7,
            trial_days: 1,
        };
        assert_eq!(pricing.amount_for(10), Some(10_000));
        assert_eq!(pricing.amount_for(u32::MAX), Some(u64::from(u32::MAX) * 1000));

        let steep = Pricing {
            price_per_day: u64::MAX,
            ..pricing
        };
        assert_eq!(steep.amount_for(2), None);
    }

    #[test]
    fn poll_budget() {
        let polling = PollSettings {
            interval: Duration::from_secs(5),
            max_attempts: 60,
        };
        assert_eq!(polling.budget(), Some(Duration::from_secs(300)));

        let endless = PollSettings {
            interval: Duration::from_secs(u64::MAX),
            max_attempts: 2,
        };
        assert_eq!(endless.budget(), None);
    }

    fn file() -> BotConfigFile {
        BotConfigFile {
            bot_token: "123:abc".into(),
            admin_id: 42,
        }
    }

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Config::from_lookup(file(), |key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_are_valid() {
        let config = load(&[]).unwrap();
        assert_eq!(config.polling.budget(), Some(Duration::from_secs(300)));
        assert_eq!(config.maintenance.sweep_interval, Duration::from_secs(30));
        assert_eq!(config.order_prefix, "VPN");
    }

    #[test]
    fn zero_settings_are_fatal() {
        for key in [
            "POLL_INTERVAL_SECS",
            "POLL_MAX_ATTEMPTS",
            "MIN_DAYS_PURCHASE",
            "TRIAL_DAYS",
            "AUTO_DELETE_INTERVAL_SECS",
            "AUTO_BACKUP_INTERVAL_SECS",
        ] {
            let err = load(&[(key, "0")]).unwrap_err();
            assert!(err.to_string().contains(key), "{}: {}", key, err);
        }
    }

    #[test]
    fn overflowing_payment_window_is_fatal() {
        let max = u64::MAX.to_string();
        assert!(load(&[("POLL_INTERVAL_SECS", &max), ("POLL_MAX_ATTEMPTS", "2")]).is_err());
        // fits in std but not in a chrono duration
        assert!(load(&[("POLL_INTERVAL_SECS", &max), ("POLL_MAX_ATTEMPTS", "1")]).is_err());
    }

    #[test]
    fn bot_config_file_parses() {
        let file: BotConfigFile =
            serde_json::from_str(r#"{"bot_token":"123:abc","admin_id":42}"#).unwrap();
        assert_eq!(file.admin_id, 42);
        assert_eq!(file.bot_token, "123:abc");
    }
}
