// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

pub mod accounts;
pub mod categories;
pub mod fx;
pub mod goals;
pub mod installments;
pub mod postings;
pub mod validation;

use rusqlite::Connection;

use crate::config::Config;
use crate::db;
use crate::errors::Result;

pub use accounts::{AccountUpdate, Accounts, NewAccount};
pub use categories::Categories;
pub use fx::Fx;
pub use goals::{GoalUpdate, Goals};
pub use installments::{InstallmentPlans, NewPlan, PlanUpdate};
pub use postings::{Postings, TransactionFilter, TransactionOrder, TransactionSpec};

/// A connection plus the configuration every engine is built with.
///
/// One `Ledger` per thread; SQLite serializes writers across connections.
pub struct Ledger {
    conn: Connection,
    config: Config,
}

impl Ledger {
    pub fn new(conn: Connection, config: Config) -> Self {
        Self { conn, config }
    }

    /// Use the configuration stored in the database.
    pub fn open(conn: Connection) -> Result<Self> {
        let config = Config::load(&conn)?;
        Ok(Self::new(conn, config))
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(db::open_in_memory()?, Config::default()))
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Re-read configuration after a settings change.
    pub fn reload_config(&mut self) -> Result<()> {
        self.config = Config::load(&self.conn)?;
        Ok(())
    }

    pub fn accounts(&self) -> Accounts<'_> {
        Accounts::new(&self.conn, &self.config)
    }

    pub fn categories(&self) -> Categories<'_> {
        Categories::new(&self.conn)
    }

    pub fn goals(&self) -> Goals<'_> {
        Goals::new(&self.conn, &self.config)
    }

    pub fn transactions(&self) -> Postings<'_> {
        Postings::new(&self.conn, &self.config)
    }

    pub fn plans(&self) -> InstallmentPlans<'_> {
        InstallmentPlans::new(&self.conn, &self.config)
    }

    pub fn fx(&self) -> Fx<'_> {
        Fx::new(&self.conn, &self.config)
    }
}
