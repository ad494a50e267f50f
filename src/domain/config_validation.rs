//! Configuration validation.
//!
//! Validates every section the binary reads before any store or market is
//! opened.

use crate::domain::candle::MIN_CANDLE_INTERVAL_SECS;
use crate::domain::error::VerdictError;
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_POLL_INTERVAL_SECS: i64 = 60;

/// Where candles are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandleSource {
    Csv,
    Sqlite,
}

impl CandleSource {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, VerdictError> {
        let value = config
            .get_string("market", "source")
            .unwrap_or_else(|| "csv".to_string());
        match value.trim().to_lowercase().as_str() {
            "csv" => Ok(CandleSource::Csv),
            "sqlite" => Ok(CandleSource::Sqlite),
            other => Err(VerdictError::ConfigInvalid {
                section: "market".to_string(),
                key: "source".to_string(),
                reason: format!("unknown source '{}', expected csv or sqlite", other),
            }),
        }
    }
}

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), VerdictError> {
    validate_providers(config)?;
    validate_candle_interval(config)?;
    validate_source(config)?;
    required_string(config, "sqlite", "path")?;
    positive_int(config, "sqlite", "pool_size", 4)?;
    positive_int(
        config,
        "runner",
        "poll_interval_secs",
        DEFAULT_POLL_INTERVAL_SECS,
    )?;
    positive_int(config, "runner", "max_passes", 100_000)?;
    Ok(())
}

fn validate_providers(config: &dyn ConfigPort) -> Result<(), VerdictError> {
    if config.get_list("market", "providers").is_empty() {
        return Err(VerdictError::ConfigMissing {
            section: "market".to_string(),
            key: "providers".to_string(),
        });
    }
    Ok(())
}

fn validate_candle_interval(config: &dyn ConfigPort) -> Result<(), VerdictError> {
    let interval = positive_int(config, "market", "candle_interval_secs", 60)?;
    if interval < MIN_CANDLE_INTERVAL_SECS {
        return Err(VerdictError::ConfigInvalid {
            section: "market".to_string(),
            key: "candle_interval_secs".to_string(),
            reason: format!(
                "candle_interval_secs must be at least {}",
                MIN_CANDLE_INTERVAL_SECS
            ),
        });
    }
    Ok(())
}

fn validate_source(config: &dyn ConfigPort) -> Result<(), VerdictError> {
    match CandleSource::from_config(config)? {
        CandleSource::Csv => required_string(config, "csv", "path").map(|_| ()),
        CandleSource::Sqlite => Ok(()),
    }
}

pub fn required_string(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<String, VerdictError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(VerdictError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
    }
}

/// Reads an optional positive integer, rejecting values that do not parse.
pub fn positive_int(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<i64, VerdictError> {
    let value = match config.get_string(section, key) {
        None => default,
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map_err(|_| VerdictError::ConfigInvalid {
                section: section.to_string(),
                key: key.to_string(),
                reason: format!("'{}' is not an integer", raw.trim()),
            })?,
    };
    if value <= 0 {
        return Err(VerdictError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: format!("{} must be positive", key),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    const VALID: &str = r#"
[market]
providers = BINANCE, COINBASE
candle_interval_secs = 60
source = csv

[csv]
path = ./candles

[sqlite]
path = ./verdict.db
pool_size = 2

[runner]
poll_interval_secs = 30
max_passes = 1000
"#;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    fn invalid_key(err: VerdictError) -> String {
        match err {
            VerdictError::ConfigInvalid { key, .. } | VerdictError::ConfigMissing { key, .. } => {
                key
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(validate_config(&make_config(VALID)).is_ok());
    }

    #[test]
    fn defaults_fill_optional_keys() {
        let config = make_config("[market]\nproviders = BINANCE\n[csv]\npath = c\n[sqlite]\npath = db\n");
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn missing_providers_fails() {
        let config = make_config(&VALID.replace("providers = BINANCE, COINBASE", "providers = ,"));
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, VerdictError::ConfigMissing { ref key, .. } if key == "providers"));
    }

    #[test]
    fn zero_interval_fails() {
        let config = make_config(&VALID.replace("candle_interval_secs = 60", "candle_interval_secs = 0"));
        assert_eq!(invalid_key(validate_config(&config).unwrap_err()), "candle_interval_secs");
    }

    #[test]
    fn interval_shorter_than_four_ticks_fails() {
        for short in ["1", "3"] {
            let config = make_config(&VALID.replace(
                "candle_interval_secs = 60",
                &format!("candle_interval_secs = {}", short),
            ));
            let err = validate_config(&config).unwrap_err();
            assert!(err.to_string().contains("at least 4"), "{err}");
            assert_eq!(invalid_key(err), "candle_interval_secs");
        }
        let config = make_config(&VALID.replace("candle_interval_secs = 60", "candle_interval_secs = 4"));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn non_numeric_interval_fails() {
        let config = make_config(&VALID.replace("candle_interval_secs = 60", "candle_interval_secs = soon"));
        assert_eq!(invalid_key(validate_config(&config).unwrap_err()), "candle_interval_secs");
    }

    #[test]
    fn unknown_source_fails() {
        let config = make_config(&VALID.replace("source = csv", "source = ftp"));
        assert_eq!(invalid_key(validate_config(&config).unwrap_err()), "source");
    }

    #[test]
    fn csv_source_requires_path() {
        let config = make_config(&VALID.replace("path = ./candles", ""));
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, VerdictError::ConfigMissing { ref section, .. } if section == "csv"));
    }

    #[test]
    fn sqlite_source_needs_no_csv_path() {
        let config = make_config(
            &VALID
                .replace("source = csv", "source = sqlite")
                .replace("path = ./candles", ""),
        );
        assert!(validate_config(&config).is_ok());
        assert_eq!(CandleSource::from_config(&config).unwrap(), CandleSource::Sqlite);
    }

    #[test]
    fn sqlite_path_required() {
        let config = make_config(&VALID.replace("path = ./verdict.db", ""));
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, VerdictError::ConfigMissing { ref section, .. } if section == "sqlite"));
    }

    #[test]
    fn poll_interval_must_be_positive() {
        let config = make_config(&VALID.replace("poll_interval_secs = 30", "poll_interval_secs = -1"));
        assert_eq!(invalid_key(validate_config(&config).unwrap_err()), "poll_interval_secs");
    }

    #[test]
    fn max_passes_must_be_positive() {
        let config = make_config(&VALID.replace("max_passes = 1000", "max_passes = 0"));
        assert_eq!(invalid_key(validate_config(&config).unwrap_err()), "max_passes");
    }
}
