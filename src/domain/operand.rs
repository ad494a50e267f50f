//! Condition operands: literal numbers, coin prices and market caps.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operand {
    Number {
        value: f64,
    },
    Coin {
        provider: String,
        base_asset: String,
        quote_asset: String,
    },
    Marketcap {
        provider: String,
        base_asset: String,
    },
}

impl Operand {
    pub fn coin(provider: &str, base_asset: &str, quote_asset: &str) -> Self {
        Operand::Coin {
            provider: provider.to_uppercase(),
            base_asset: base_asset.to_uppercase(),
            quote_asset: quote_asset.to_uppercase(),
        }
    }

    pub fn marketcap(provider: &str, base_asset: &str) -> Self {
        Operand::Marketcap {
            provider: provider.to_uppercase(),
            base_asset: base_asset.to_uppercase(),
        }
    }

    pub fn number(value: f64) -> Self {
        Operand::Number { value }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Operand::Number { .. })
    }

    pub fn provider(&self) -> Option<&str> {
        match self {
            Operand::Number { .. } => None,
            Operand::Coin { provider, .. } | Operand::Marketcap { provider, .. } => {
                Some(provider)
            }
        }
    }

    /// Canonical key used to look up ticks and streams, e.g. `COIN:BINANCE:BTC-USDT`.
    pub fn key(&self) -> String {
        match self {
            Operand::Number { value } => format!("NUMBER:{}", value),
            Operand::Coin {
                provider,
                base_asset,
                quote_asset,
            } => format!("COIN:{}:{}-{}", provider, base_asset, quote_asset),
            Operand::Marketcap {
                provider,
                base_asset,
            } => format!("MARKETCAP:{}:{}", provider, base_asset),
        }
    }

    /// Parses `COIN:<PROVIDER>:<BASE>-<QUOTE>`, `MARKETCAP:<PROVIDER>:<BASE>` or a
    /// number. Numbers accept `_` and `,` separators and a `k`, `m` or `b` suffix.
    pub fn parse(input: &str) -> Result<Operand, String> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err("empty operand".to_string());
        }
        let upper = trimmed.to_uppercase();
        let parts: Vec<&str> = upper.split(':').collect();
        match parts.as_slice() {
            ["COIN", provider, pair] => {
                let (base, quote) = pair
                    .split_once('-')
                    .ok_or_else(|| format!("expected BASE-QUOTE pair, found '{}'", pair))?;
                validate_symbol(provider)?;
                validate_symbol(base)?;
                validate_symbol(quote)?;
                Ok(Operand::coin(provider, base, quote))
            }
            ["MARKETCAP", provider, base] => {
                validate_symbol(provider)?;
                validate_symbol(base)?;
                Ok(Operand::marketcap(provider, base))
            }
            [single] => parse_number(single).map(Operand::number),
            _ => Err(format!("unrecognised operand '{}'", trimmed)),
        }
    }
}

fn validate_symbol(symbol: &str) -> Result<(), String> {
    if symbol.is_empty() || !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(format!("invalid symbol '{}'", symbol));
    }
    Ok(())
}

fn parse_number(input: &str) -> Result<f64, String> {
    let cleaned: String = input.chars().filter(|c| *c != '_' && *c != ',').collect();
    let (digits, multiplier) = match cleaned.chars().last() {
        Some('K') => (&cleaned[..cleaned.len() - 1], 1e3),
        Some('M') => (&cleaned[..cleaned.len() - 1], 1e6),
        Some('B') => (&cleaned[..cleaned.len() - 1], 1e9),
        _ => (cleaned.as_str(), 1.0),
    };
    let value: f64 = digits
        .parse()
        .map_err(|_| format!("invalid number '{}'", input))?;
    if !value.is_finite() {
        return Err(format!("invalid number '{}'", input));
    }
    Ok(value * multiplier)
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Number { value } => write!(f, "{}", value),
            _ => f.write_str(&self.key()),
        }
    }
}
