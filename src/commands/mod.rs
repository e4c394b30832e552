// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

pub mod accounts;
pub mod categories;
pub mod doctor;
pub mod fx;
pub mod goals;
pub mod plans;
pub mod settings;
pub mod transactions;

use anyhow::{Context, Result, anyhow};
use clap::ArgMatches;
use serde::Serialize;

use crate::money::format_minor;
use crate::utils::{maybe_print_json, parse_amount};

/// Flags every handler reads from the global arguments.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub owner_id: i64,
    pub json: bool,
    pub jsonl: bool,
    pub minor: bool,
}

impl Output {
    pub fn from_matches(m: &ArgMatches) -> Self {
        Self {
            owner_id: m.get_one::<i64>("user").copied().unwrap_or(1),
            json: m.get_flag("json"),
            jsonl: m.get_flag("jsonl"),
            minor: m.get_flag("minor"),
        }
    }

    /// Print `v` as JSON when asked; returns whether anything was printed.
    pub fn json<T: Serialize>(&self, v: &T) -> Result<bool> {
        maybe_print_json(self.json, self.jsonl, v)
    }

    pub fn money(&self, amount: i64) -> String {
        if self.minor {
            amount.to_string()
        } else {
            format_minor(amount)
        }
    }

    /// Parse a non-negative amount argument in the unit the caller selected.
    pub fn amount(&self, field: &str, raw: &str) -> Result<i64> {
        Ok(parse_amount(raw, self.minor)?.to_minor(field)?)
    }

    /// Signed variant for balances.
    pub fn signed_amount(&self, field: &str, raw: &str) -> Result<i64> {
        let raw = raw.trim();
        match raw.strip_prefix('-') {
            Some(rest) => Ok(-self.amount(field, rest)?),
            None => self.amount(field, raw),
        }
    }

    pub fn opt_amount(&self, m: &ArgMatches, id: &str) -> Result<Option<i64>> {
        m.get_one::<String>(id)
            .map(|raw| self.amount(id, raw))
            .transpose()
    }
}

pub(crate) fn required<'a>(m: &'a ArgMatches, id: &str) -> Result<&'a String> {
    m.get_one::<String>(id)
        .ok_or_else(|| anyhow!("missing required argument '{}'", id))
}

pub(crate) fn required_id(m: &ArgMatches, id: &str) -> Result<i64> {
    m.get_one::<i64>(id)
        .copied()
        .with_context(|| format!("missing required argument '{}'", id))
}

pub(crate) fn required_count(m: &ArgMatches, id: &str) -> Result<u32> {
    m.get_one::<u32>(id)
        .copied()
        .with_context(|| format!("missing required argument '{}'", id))
}
