use std::env;

use crate::data::FilterParams;

pub const DEFAULT_UPSTREAM_BASE: &str = "https://www.basketball-bund.net/rest";
pub const DEFAULT_CLUB_ID: &str = "4307";
pub const DEFAULT_BIND: &str = "127.0.0.1:3000";

/// Deployment settings, read from the environment (after `.env` files are loaded).
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub upstream_base: String,
    pub club_id: String,
    pub default_filters: FilterParams,
    pub bind: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upstream_base: DEFAULT_UPSTREAM_BASE.to_string(),
            club_id: DEFAULT_CLUB_ID.to_string(),
            default_filters: FilterParams::default(),
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let opt = |key: &str| {
            lookup(key).and_then(|val| {
                let val = val.trim().to_string();
                if val.is_empty() {
                    None
                } else {
                    Some(val)
                }
            })
        };

        let defaults = Config::default();
        let just_home = opt("R2S_DEFAULT_JUST_HOME")
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(defaults.default_filters.just_home);
        let range_days = opt("R2S_DEFAULT_RANGE_DAYS")
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|d| *d >= FilterParams::MIN_RANGE_DAYS)
            .unwrap_or(defaults.default_filters.range_days);

        Self {
            upstream_base: opt("R2S_UPSTREAM_BASE").unwrap_or(defaults.upstream_base),
            club_id: opt("R2S_CLUB_ID").unwrap_or(defaults.club_id),
            default_filters: FilterParams {
                just_home,
                range_days,
            },
            bind: opt("R2S_BIND").unwrap_or(defaults.bind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_env() {
        assert_eq!(config_from(&[]), Config::default());
    }

    #[test]
    fn reads_overrides_and_ignores_blank_values() {
        let config = config_from(&[
            ("R2S_CLUB_ID", "1234"),
            ("R2S_UPSTREAM_BASE", "   "),
            ("R2S_DEFAULT_JUST_HOME", "true"),
            ("R2S_DEFAULT_RANGE_DAYS", "8"),
        ]);
        assert_eq!(config.club_id, "1234");
        assert_eq!(config.upstream_base, DEFAULT_UPSTREAM_BASE);
        assert!(config.default_filters.just_home);
        assert_eq!(config.default_filters.range_days, 8);
    }

    #[test]
    fn bad_numbers_fall_back() {
        let config = config_from(&[("R2S_DEFAULT_RANGE_DAYS", "0"), ("R2S_DEFAULT_JUST_HOME", "ja")]);
        assert_eq!(config.default_filters, FilterParams::default());
    }
}
