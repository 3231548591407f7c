use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use vigil_api::auth::ApiConfig;
use vigil_lifecycle::SweepBudget;

/// Placeholder secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

/// Upper bound for the staleness threshold (30 days).
const MAX_STALENESS_SECS: u64 = 30 * 24 * 3600;

pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: String,
    pub api: ApiConfig,
    pub reconcile_interval: Duration,
    pub expiry_interval: Duration,
    /// When false, sweeps only run when the cron routes are hit.
    pub background_sweeps: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = get("VIGIL_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("VIGIL_JWT_SECRET is unset or still a placeholder; it must match the auth provider's secret");
        }

        let cron_secret = get("VIGIL_CRON_SECRET").filter(|s| !s.is_empty());
        if cron_secret.as_deref().is_some_and(|s| PLACEHOLDER_SECRETS.contains(&s)) {
            bail!("VIGIL_CRON_SECRET is still a placeholder");
        }

        let purge_hours: u64 = parse_or(&get, "VIGIL_PURGE_AFTER_HOURS", 168)?;
        // 0 disables physical purge
        let purge_after = match purge_hours {
            0 => None,
            hours => Some(Duration::from_secs(hours.checked_mul(3600).with_context(
                || format!("VIGIL_PURGE_AFTER_HOURS is too large: {}", hours),
            )?)),
        };

        let staleness_secs: u64 = parse_or(&get, "VIGIL_STALENESS_SECS", 300)?;
        if staleness_secs == 0 || staleness_secs > MAX_STALENESS_SECS {
            bail!(
                "VIGIL_STALENESS_SECS must be between 1 and {}, got {}",
                MAX_STALENESS_SECS,
                staleness_secs
            );
        }

        Ok(Self {
            host: get("VIGIL_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&get, "VIGIL_PORT", 3000)?,
            db_path: get("VIGIL_DB_PATH").unwrap_or_else(|| "vigil.db".into()),
            api: ApiConfig {
                jwt_secret,
                cron_secret,
                staleness: Duration::from_secs(staleness_secs),
                sweep_budget: SweepBudget {
                    batch_size: parse_or(&get, "VIGIL_SWEEP_BATCH_SIZE", 500)?,
                    time_budget: Duration::from_millis(parse_or(
                        &get,
                        "VIGIL_SWEEP_BUDGET_MS",
                        2000,
                    )?),
                },
                purge_after,
            },
            reconcile_interval: interval_secs(&get, "VIGIL_RECONCILE_INTERVAL_SECS", 60)?,
            expiry_interval: interval_secs(&get, "VIGIL_EXPIRY_INTERVAL_SECS", 60)?,
            background_sweeps: parse_or(&get, "VIGIL_BACKGROUND_SWEEPS", true)?,
        })
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}

/// Sweep cadence in whole seconds. Zero is refused: a timer cannot tick at
/// a zero period.
fn interval_secs(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u64,
) -> Result<Duration> {
    match parse_or(get, key, default)? {
        0 => bail!("{} must be at least 1 second", key),
        secs => Ok(Duration::from_secs(secs)),
    }
}
