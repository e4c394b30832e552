// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Month-keyed exchange rates and per-user base currency.
//!
//! A row `(base, quote, year, month, rate)` reads "one `quote` costs `rate`
//! `base`", so converting an amount in `base` to `quote` divides by the rate.

use chrono::{Datelike, NaiveDate};
use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::config::Config;
use crate::errors::{FinanceError, Result};
use crate::models::ExchangeRate;
use crate::money::{self, normalize_currency};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateQuote {
    pub from: String,
    pub to: String,
    /// Units of `from` per one unit of `to`.
    pub rate: Decimal,
    /// The stored row the quote was derived from.
    pub row: Option<ExchangeRate>,
    /// True when only the `(to, from)` row exists and `rate` is its inverse.
    pub inverted: bool,
    /// Set when the row is older than the requested month.
    pub warning: Option<String>,
}

impl RateQuote {
    pub fn is_stale(&self) -> bool {
        self.warning.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conversion {
    pub amount: i64,
    pub rate: Decimal,
    pub warning: Option<String>,
}

pub struct Fx<'a> {
    conn: &'a Connection,
    config: &'a Config,
}

impl<'a> Fx<'a> {
    pub fn new(conn: &'a Connection, config: &'a Config) -> Self {
        Self { conn, config }
    }

    /// Insert or replace the rate for `(base, quote, year, month)`.
    pub fn upsert_rate(
        &self,
        base: &str,
        quote: &str,
        year: i32,
        month: u32,
        rate: Decimal,
        source: Option<&str>,
    ) -> Result<ExchangeRate> {
        let base = self.supported(base, "base")?;
        let quote = self.supported(quote, "quote")?;
        if base == quote {
            return Err(FinanceError::validation("quote", "same_as_base"));
        }
        if !(1..=12).contains(&month) {
            return Err(FinanceError::validation("month", "out_of_range"));
        }
        if rate <= Decimal::ZERO {
            return Err(FinanceError::validation("rate", "must_be_positive"));
        }
        let source = source.map(str::trim).filter(|s| !s.is_empty()).unwrap_or("manual");
        self.conn.execute(
            "INSERT INTO exchange_rates(base, quote, year, month, rate, source)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(base, quote, year, month)
             DO UPDATE SET rate=excluded.rate, source=excluded.source",
            params![base, quote, year, month, rate.normalize().to_string(), source],
        )?;
        tracing::info!(%base, %quote, year, month, %rate, source, "exchange rate stored");
        let sql = format!(
            "SELECT {} FROM exchange_rates WHERE base=?1 AND quote=?2 AND year=?3 AND month=?4",
            ExchangeRate::COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![base, quote, year, month], ExchangeRate::from_row)?)
    }

    pub fn get_rate_row(&self, id: i64) -> Result<ExchangeRate> {
        let sql = format!("SELECT {} FROM exchange_rates WHERE id=?1", ExchangeRate::COLUMNS);
        self.conn
            .query_row(&sql, params![id], ExchangeRate::from_row)
            .optional()?
            .ok_or(FinanceError::NotFound {
                entity: "exchange_rate",
                id,
            })
    }

    pub fn list_rates(&self, base: Option<&str>, quote: Option<&str>) -> Result<Vec<ExchangeRate>> {
        let base = base.map(normalize_currency).transpose()?;
        let quote = quote.map(normalize_currency).transpose()?;
        let sql = format!(
            "SELECT {} FROM exchange_rates
             WHERE (?1 IS NULL OR base=?1) AND (?2 IS NULL OR quote=?2)
             ORDER BY base, quote, year DESC, month DESC",
            ExchangeRate::COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![base, quote], ExchangeRate::from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn delete_rate(&self, id: i64) -> Result<()> {
        let n = self
            .conn
            .execute("DELETE FROM exchange_rates WHERE id=?1", params![id])?;
        if n == 0 {
            return Err(FinanceError::NotFound {
                entity: "exchange_rate",
                id,
            });
        }
        Ok(())
    }

    /// Rate for `from → to` in the month of `on_date`, falling back to the most
    /// recent earlier month (with a warning). A `to → from` row is used
    /// inverted when it is newer than every direct row.
    pub fn rate(&self, from: &str, to: &str, on_date: NaiveDate) -> Result<RateQuote> {
        let from = normalize_currency(from)?;
        let to = normalize_currency(to)?;
        if from == to {
            return Ok(RateQuote {
                from,
                to,
                rate: Decimal::ONE,
                row: None,
                inverted: false,
                warning: None,
            });
        }

        let (year, month) = (on_date.year(), on_date.month());
        // freshest month wins; the direct pair breaks ties
        let direct = self.latest(&from, &to, year, month)?;
        let inverse = self.latest(&to, &from, year, month)?;
        let (row, inverted) = match (direct, inverse) {
            (Some(d), Some(i)) if (i.year, i.month) > (d.year, d.month) => (i, true),
            (Some(d), _) => (d, false),
            (None, Some(i)) => (i, true),
            (None, None) => {
                return Err(FinanceError::NoRateAvailable {
                    pair: format!("{}/{}", from, to),
                    on_date,
                });
            }
        };

        let rate = if inverted {
            Decimal::ONE
                .checked_div(row.rate)
                .ok_or_else(|| FinanceError::validation("rate", "out_of_range"))?
        } else {
            row.rate
        };
        let warning = if (row.year, row.month) != (year, month) {
            let requested = format!("{:04}-{:02}", year, month);
            tracing::warn!(
                pair = %format!("{}/{}", from, to),
                requested = %requested,
                used = %row.period(),
                "stale exchange rate"
            );
            Some(format!(
                "No {}/{} rate for {}; using the {} rate",
                from,
                to,
                requested,
                row.period()
            ))
        } else {
            None
        };

        Ok(RateQuote {
            from,
            to,
            rate,
            row: Some(row),
            inverted,
            warning,
        })
    }

    pub fn convert(
        &self,
        amount: i64,
        from: &str,
        to: &str,
        on_date: NaiveDate,
    ) -> Result<Conversion> {
        let quote = self.rate(from, to, on_date)?;
        let converted = match &quote.row {
            None => amount,
            // multiply by the stored rate rather than divide by its inverse
            Some(row) if quote.inverted => money::scale(amount, row.rate)?,
            Some(row) => money::divide(amount, row.rate)?,
        };
        Ok(Conversion {
            amount: converted,
            rate: quote.rate,
            warning: quote.warning,
        })
    }

    pub fn base_currency(&self, user_id: i64) -> Result<String> {
        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT base_currency FROM user_settings WHERE user_id=?1",
                params![user_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(stored.unwrap_or_else(|| self.config.base_currency_default.clone()))
    }

    pub fn set_base_currency(&self, user_id: i64, currency: &str) -> Result<String> {
        let currency = self.supported(currency, "currency")?;
        self.conn.execute(
            "INSERT INTO user_settings(user_id, base_currency) VALUES (?1, ?2)
             ON CONFLICT(user_id) DO UPDATE SET base_currency=excluded.base_currency",
            params![user_id, currency],
        )?;
        tracing::info!(user_id, %currency, "base currency set");
        Ok(currency)
    }

    fn supported(&self, code: &str, field: &str) -> Result<String> {
        let code = normalize_currency(code).map_err(|_| FinanceError::validation(field, "invalid_code"))?;
        if !self.config.is_supported(&code) {
            return Err(FinanceError::validation(field, "unsupported"));
        }
        Ok(code)
    }

    fn latest(&self, base: &str, quote: &str, year: i32, month: u32) -> Result<Option<ExchangeRate>> {
        let sql = format!(
            "SELECT {} FROM exchange_rates
             WHERE base=?1 AND quote=?2 AND (year < ?3 OR (year = ?3 AND month <= ?4))
             ORDER BY year DESC, month DESC LIMIT 1",
            ExchangeRate::COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![base, quote, year, month], ExchangeRate::from_row)
            .optional()?)
    }
}
