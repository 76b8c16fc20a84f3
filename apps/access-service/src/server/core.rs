use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const DEFAULT_OPERATION_TIMEOUT_MILLIS: u64 = 5_000;
pub const DEFAULT_NOTIFICATION_QUEUE: usize = 256;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
/// Resolution reason recorded on pending requests superseded by a new one.
pub const DUPLICATE_REQUEST_REASON: &str = "duplicate request";

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Upper bound for a single lifecycle operation, store round-trips included.
    pub operation_timeout: Duration,
    pub notification_queue: usize,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_millis(DEFAULT_OPERATION_TIMEOUT_MILLIS),
            notification_queue: DEFAULT_NOTIFICATION_QUEUE,
            database_url: None,
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
        }
    }
}

impl AppConfig {
    /// Read configuration from `ACCESS_*` environment variables.
    ///
    /// # Errors
    /// Returns an error when a numeric variable is present but unparsable or zero.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();
        let timeout_millis = parse_positive(
            &lookup,
            "ACCESS_OPERATION_TIMEOUT_MILLIS",
            DEFAULT_OPERATION_TIMEOUT_MILLIS,
        )?;
        let notification_queue =
            parse_positive(&lookup, "ACCESS_NOTIFICATION_QUEUE", defaults.notification_queue)?;
        let db_max_connections =
            parse_positive(&lookup, "ACCESS_DB_MAX_CONNECTIONS", defaults.db_max_connections)?;
        let database_url = lookup("ACCESS_DATABASE_URL").filter(|value| !value.trim().is_empty());

        Ok(Self {
            operation_timeout: Duration::from_millis(timeout_millis),
            notification_queue,
            database_url,
            db_max_connections,
        })
    }
}

fn parse_positive<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> anyhow::Result<T>
where
    T: std::str::FromStr + PartialEq + Default,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    let value = raw
        .trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("invalid {key} value {raw:?}: {e}"))?;
    if value == T::default() {
        return Err(anyhow::anyhow!("{key} must be greater than zero"));
    }
    Ok(value)
}

pub(crate) fn now_unix() -> i64 {
    let now = SystemTime::now();
    let seconds = now
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs();
    i64::try_from(seconds).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, time::Duration};

    use super::{AppConfig, DEFAULT_DB_MAX_CONNECTIONS, DEFAULT_NOTIFICATION_QUEUE};

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.notification_queue, DEFAULT_NOTIFICATION_QUEUE);
        assert_eq!(config.db_max_connections, DEFAULT_DB_MAX_CONNECTIONS);
        assert_eq!(config.database_url, None);
    }

    #[test]
    fn environment_overrides_are_parsed() {
        let config = AppConfig::from_lookup(lookup(&[
            ("ACCESS_OPERATION_TIMEOUT_MILLIS", "250"),
            ("ACCESS_NOTIFICATION_QUEUE", "8"),
            ("ACCESS_DATABASE_URL", "postgres://access@localhost/access"),
        ]))
        .unwrap();
        assert_eq!(config.operation_timeout, Duration::from_millis(250));
        assert_eq!(config.notification_queue, 8);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://access@localhost/access")
        );
    }

    #[test]
    fn malformed_or_zero_values_are_rejected() {
        assert!(AppConfig::from_lookup(lookup(&[("ACCESS_NOTIFICATION_QUEUE", "lots")])).is_err());
        assert!(
            AppConfig::from_lookup(lookup(&[("ACCESS_OPERATION_TIMEOUT_MILLIS", "0")])).is_err()
        );
    }
}
