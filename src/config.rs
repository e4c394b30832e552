// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Engine configuration persisted in the `settings` table.

use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

use crate::errors::{FinanceError, Result};
use crate::money::normalize_currency;

pub const KEY_GMF_RATE: &str = "gmf_rate";
pub const KEY_SUPPORTED_CURRENCIES: &str = "supported_currencies";
pub const KEY_ACCOUNT_LIMIT: &str = "account_limit_per_user";
pub const KEY_BASE_CURRENCY_DEFAULT: &str = "base_currency_default";
pub const KEY_INSTALLMENT_ROUNDING: &str = "installment_rounding";

pub const KEYS: [&str; 5] = [
    KEY_GMF_RATE,
    KEY_SUPPORTED_CURRENCIES,
    KEY_ACCOUNT_LIMIT,
    KEY_BASE_CURRENCY_DEFAULT,
    KEY_INSTALLMENT_ROUNDING,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rounding {
    HalfUp,
}

impl Rounding {
    pub fn strategy(&self) -> RoundingStrategy {
        match self {
            Rounding::HalfUp => RoundingStrategy::MidpointAwayFromZero,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Rounding::HalfUp => "half_up",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Levy on outflows from non-exempt asset accounts, as a fraction (0.004 = 4 per mil).
    pub gmf_rate: Decimal,
    pub supported_currencies: BTreeSet<String>,
    pub account_limit_per_user: u32,
    pub base_currency_default: String,
    pub installment_rounding: Rounding,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gmf_rate: Decimal::new(4, 3),
            supported_currencies: ["COP", "USD", "EUR", "MXN", "GBP"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            account_limit_per_user: 50,
            base_currency_default: "COP".into(),
            installment_rounding: Rounding::HalfUp,
        }
    }
}

impl Config {
    /// Read every known key from `settings`; missing keys keep their defaults.
    pub fn load(conn: &Connection) -> Result<Config> {
        let mut cfg = Config::default();
        for key in KEYS {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT value FROM settings WHERE key=?1",
                    params![key],
                    |r| r.get(0),
                )
                .optional()?;
            if let Some(v) = raw {
                cfg.apply(key, &v)?;
            }
        }
        Ok(cfg)
    }

    pub fn save(&self, conn: &Connection) -> Result<()> {
        for key in KEYS {
            write_setting(conn, key, &self.value_of(key)?)?;
        }
        Ok(())
    }

    /// Validate and persist a single key, returning the updated configuration.
    pub fn set(conn: &Connection, key: &str, value: &str) -> Result<Config> {
        let mut cfg = Config::load(conn)?;
        cfg.apply(key, value)?;
        write_setting(conn, key, &cfg.value_of(key)?)?;
        tracing::info!(key, value = %cfg.value_of(key)?, "setting updated");
        Ok(cfg)
    }

    pub fn is_supported(&self, currency: &str) -> bool {
        self.supported_currencies.contains(currency)
    }

    pub fn value_of(&self, key: &str) -> Result<String> {
        let v = match key {
            KEY_GMF_RATE => self.gmf_rate.to_string(),
            KEY_SUPPORTED_CURRENCIES => self
                .supported_currencies
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(","),
            KEY_ACCOUNT_LIMIT => self.account_limit_per_user.to_string(),
            KEY_BASE_CURRENCY_DEFAULT => self.base_currency_default.clone(),
            KEY_INSTALLMENT_ROUNDING => self.installment_rounding.as_str().to_string(),
            _ => return Err(bad(key, "unknown setting")),
        };
        Ok(v)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match key {
            KEY_GMF_RATE => {
                let rate = Decimal::from_str(value).map_err(|_| bad(key, "not a decimal"))?;
                if rate < Decimal::ZERO || rate >= Decimal::ONE {
                    return Err(bad(key, "must be in [0, 1)"));
                }
                self.gmf_rate = rate;
            }
            KEY_SUPPORTED_CURRENCIES => {
                let mut set = BTreeSet::new();
                for part in value.split(',').filter(|p| !p.trim().is_empty()) {
                    let code = normalize_currency(part).map_err(|_| bad(key, "invalid currency code"))?;
                    set.insert(code);
                }
                if set.is_empty() {
                    return Err(bad(key, "at least one currency is required"));
                }
                self.supported_currencies = set;
            }
            KEY_ACCOUNT_LIMIT => {
                let limit: u32 = value.parse().map_err(|_| bad(key, "not a positive integer"))?;
                if limit == 0 {
                    return Err(bad(key, "must be at least 1"));
                }
                self.account_limit_per_user = limit;
            }
            KEY_BASE_CURRENCY_DEFAULT => {
                self.base_currency_default =
                    normalize_currency(value).map_err(|_| bad(key, "invalid currency code"))?;
            }
            KEY_INSTALLMENT_ROUNDING => {
                self.installment_rounding = match value.to_lowercase().as_str() {
                    "half_up" | "half-up" => Rounding::HalfUp,
                    _ => return Err(bad(key, "only half_up is supported")),
                };
            }
            _ => return Err(bad(key, "unknown setting")),
        }
        Ok(())
    }
}

fn write_setting(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        params![key, value],
    )?;
    Ok(())
}

fn bad(key: &str, reason: &str) -> FinanceError {
    FinanceError::Config {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE settings(key TEXT PRIMARY KEY, value TEXT NOT NULL);")
            .unwrap();
        conn
    }

    #[test]
    fn defaults_when_nothing_stored() {
        let cfg = Config::load(&conn()).unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.gmf_rate.to_string(), "0.004");
        assert_eq!(cfg.account_limit_per_user, 50);
    }

    #[test]
    fn set_validates_and_persists() {
        let conn = conn();
        let cfg = Config::set(&conn, KEY_SUPPORTED_CURRENCIES, "usd, eur").unwrap();
        assert!(cfg.is_supported("USD"));
        assert!(!cfg.is_supported("COP"));
        assert_eq!(Config::load(&conn).unwrap().supported_currencies.len(), 2);

        let err = Config::set(&conn, KEY_GMF_RATE, "1.5").unwrap_err();
        assert!(matches!(err, FinanceError::Config { .. }));
        let err = Config::set(&conn, "colour", "blue").unwrap_err();
        assert!(err.to_string().contains("unknown setting"));
    }

    #[test]
    fn save_round_trips() {
        let conn = conn();
        let cfg = Config {
            account_limit_per_user: 3,
            ..Config::default()
        };
        cfg.save(&conn).unwrap();
        assert_eq!(Config::load(&conn).unwrap(), cfg);
    }
}
