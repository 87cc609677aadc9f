//! Configuration validation utilities.

use std::time::Duration;

use thiserror::Error;

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file or directory.
    #[error("failed to read config: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse YAML configuration.
    #[error("failed to parse YAML config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Configuration validation failed.
    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Parse duration string using humantime.
///
/// Supports various formats: `30s`, `1m`, `5m30s`, `1h`, `2h30m`, `1d`, `100ms`, etc.
///
/// # Examples
///
/// ```
/// use insights_operator::config::parse_duration;
///
/// assert_eq!(parse_duration("3m").unwrap().as_secs(), 180);
/// assert_eq!(parse_duration("2h").unwrap().as_secs(), 7200);
/// assert_eq!(parse_duration("1h30m").unwrap().as_secs(), 5400);
/// ```
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("duration string is empty".to_string());
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Render a duration the way operators read it in the agent logs.
///
/// Whole units are always spelled out down to seconds (`2h0m0s`, `3m0s`),
/// sub-second values use the largest fitting unit (`250ms`, `1.5µs`).
///
/// ```
/// use std::time::Duration;
/// use insights_operator::config::format_period;
///
/// assert_eq!(format_period(Duration::from_secs(7200)), "2h0m0s");
/// assert_eq!(format_period(Duration::from_secs(90)), "1m30s");
/// assert_eq!(format_period(Duration::from_millis(1500)), "1.5s");
/// ```
pub fn format_period(d: Duration) -> String {
    if d.is_zero() {
        return "0s".to_string();
    }

    if d < Duration::from_secs(1) {
        let nanos = u64::from(d.subsec_nanos());
        return if nanos < 1_000 {
            format!("{nanos}ns")
        } else if nanos < 1_000_000 {
            format!("{}µs", fixed_point(nanos, 3))
        } else {
            format!("{}ms", fixed_point(nanos, 6))
        };
    }

    let total = d.as_secs();
    let hours = total / 3600;
    let minutes = (total / 60) % 60;
    let seconds = fixed_point(
        (total % 60) * 1_000_000_000 + u64::from(d.subsec_nanos()),
        9,
    );

    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// Format `value / 10^precision` with trailing fractional zeros removed.
fn fixed_point(value: u64, precision: u32) -> String {
    let scale = 10u64.pow(precision);
    let whole = value / scale;
    let frac = value % scale;
    if frac == 0 {
        return whole.to_string();
    }
    let digits = format!("{:0width$}", frac, width = precision as usize);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}

/// Expand environment variables in a string.
/// Supports ${VAR} and ${VAR:-default} syntax.
pub fn expand_env_vars(input: &str) -> String {
    static ENV_VAR_REGEX: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();

    let regex = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("failed to compile env var regex")
    });

    regex
        .replace_all(input, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default_value = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            std::env::var(var_name).unwrap_or_else(|_| default_value.to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_valid() {
        assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("3m").unwrap(), Duration::from_secs(180));
        assert_eq!(parse_duration(" 2h ").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("100ms").unwrap(), Duration::from_millis(100));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("   ").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("30").is_err());
    }

    #[test]
    fn test_format_period_whole_units() {
        assert_eq!(format_period(Duration::from_secs(7200)), "2h0m0s");
        assert_eq!(format_period(Duration::from_secs(180)), "3m0s");
        assert_eq!(format_period(Duration::from_secs(60)), "1m0s");
        assert_eq!(format_period(Duration::from_secs(45)), "45s");
        assert_eq!(format_period(Duration::from_secs(5400)), "1h30m0s");
        assert_eq!(format_period(Duration::from_secs(86_400)), "24h0m0s");
    }

    #[test]
    fn test_format_period_fractions() {
        assert_eq!(format_period(Duration::ZERO), "0s");
        assert_eq!(format_period(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_period(Duration::from_millis(250)), "250ms");
        assert_eq!(format_period(Duration::from_micros(3250)), "3.25ms");
        assert_eq!(format_period(Duration::from_nanos(1500)), "1.5µs");
        assert_eq!(format_period(Duration::from_nanos(42)), "42ns");
        assert_eq!(format_period(Duration::from_millis(61_010)), "1m1.01s");
    }

    #[test]
    fn test_expand_env_vars_no_vars() {
        assert_eq!(expand_env_vars("plain-token"), "plain-token");
    }

    #[test]
    fn test_expand_env_vars_with_default() {
        let result = expand_env_vars("${NONEXISTENT_INSIGHTS_TOKEN_12345:-fallback}");
        assert_eq!(result, "fallback");
    }

    #[test]
    fn test_expand_env_vars_from_env() {
        // SAFETY: This test only touches a test-specific variable.
        unsafe {
            std::env::set_var("INSIGHTS_TEST_EXPAND_TOKEN", "secret_value");
        }
        let result = expand_env_vars("${INSIGHTS_TEST_EXPAND_TOKEN}");
        assert_eq!(result, "secret_value");
        // SAFETY: Cleanup test variable.
        unsafe {
            std::env::remove_var("INSIGHTS_TEST_EXPAND_TOKEN");
        }
    }
}
