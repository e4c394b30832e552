// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Account store: the source of truth for balances.

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::db;
use crate::errors::{FinanceError, Result};
use crate::models::{Account, AccountCategory, AccountType};
use crate::money::normalize_currency;
use crate::services::validation;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAccount {
    pub name: String,
    pub description: String,
    pub account_number: Option<String>,
    pub account_type: AccountType,
    pub category: AccountCategory,
    pub currency: String,
    pub opening_balance: i64,
    pub credit_limit: Option<i64>,
    pub gmf_exempt: bool,
}

impl NewAccount {
    pub fn new(
        name: impl Into<String>,
        account_type: AccountType,
        category: AccountCategory,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            account_number: None,
            account_type,
            category,
            currency: currency.into(),
            opening_balance: 0,
            credit_limit: None,
            gmf_exempt: false,
        }
    }

    pub fn opening_balance(mut self, balance: i64) -> Self {
        self.opening_balance = balance;
        self
    }

    pub fn credit_limit(mut self, limit: i64) -> Self {
        self.credit_limit = Some(limit);
        self
    }

    pub fn gmf_exempt(mut self, exempt: bool) -> Self {
        self.gmf_exempt = exempt;
        self
    }
}

/// Fields an owner may change. Balances move only through postings or `adjust_balance`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub account_number: Option<Option<String>>,
    pub credit_limit: Option<Option<i64>>,
    pub gmf_exempt: Option<bool>,
    pub is_active: Option<bool>,
}

pub struct Accounts<'a> {
    conn: &'a Connection,
    config: &'a Config,
}

impl<'a> Accounts<'a> {
    pub fn new(conn: &'a Connection, config: &'a Config) -> Self {
        Self { conn, config }
    }

    pub fn create(&self, owner_id: i64, new: &NewAccount) -> Result<Account> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(FinanceError::validation("name", "required"));
        }
        let currency = normalize_currency(&new.currency)?;
        if !self.config.is_supported(&currency) {
            return Err(FinanceError::validation("currency", "unsupported"));
        }
        if new.category == AccountCategory::CreditCard && new.account_type != AccountType::Liability {
            return Err(FinanceError::validation(
                "type",
                "credit_card_must_be_liability",
            ));
        }
        match new.credit_limit {
            Some(_) if new.category != AccountCategory::CreditCard => {
                return Err(FinanceError::validation(
                    "credit_limit",
                    "only_for_credit_cards",
                ));
            }
            Some(limit) if limit <= 0 => {
                return Err(FinanceError::validation("credit_limit", "must_be_positive"));
            }
            _ => {}
        }

        let tx = db::begin_write(self.conn)?;
        self.ensure_name_free(owner_id, name, None)?;
        self.ensure_capacity(owner_id)?;

        let probe = Account {
            id: 0,
            owner_id,
            name: name.to_string(),
            description: new.description.clone(),
            account_number: new.account_number.clone(),
            account_type: new.account_type,
            category: new.category,
            currency: currency.clone(),
            current_balance: 0,
            credit_limit: new.credit_limit,
            gmf_exempt: new.gmf_exempt,
            is_active: true,
            created_at: String::new(),
            updated_at: String::new(),
        };
        validation::check_balance_at_rest(&probe, new.opening_balance)?;

        tx.execute(
            "INSERT INTO accounts(owner_id, name, description, account_number, type, category,
                currency, current_balance, credit_limit, gmf_exempt)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                owner_id,
                name,
                new.description,
                new.account_number,
                new.account_type,
                new.category,
                currency,
                new.opening_balance,
                new.credit_limit,
                new.gmf_exempt,
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        tracing::info!(owner_id, id, name, category = %new.category, "account created");
        self.get(owner_id, id)
    }

    pub fn get(&self, owner_id: i64, id: i64) -> Result<Account> {
        let sql = format!("SELECT {} FROM accounts WHERE id=?1", Account::COLUMNS);
        let acct = self
            .conn
            .query_row(&sql, params![id], Account::from_row)
            .optional()?
            .ok_or(FinanceError::NotFound {
                entity: "account",
                id,
            })?;
        if acct.owner_id != owner_id {
            return Err(FinanceError::PermissionDenied {
                entity: "account",
                id,
            });
        }
        Ok(acct)
    }

    pub fn find_by_name(&self, owner_id: i64, name: &str) -> Result<Option<Account>> {
        let sql = format!(
            "SELECT {} FROM accounts WHERE owner_id=?1 AND name=?2 COLLATE NOCASE",
            Account::COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![owner_id, name.trim()], Account::from_row)
            .optional()?)
    }

    pub fn list(&self, owner_id: i64, include_inactive: bool) -> Result<Vec<Account>> {
        let sql = format!(
            "SELECT {} FROM accounts WHERE owner_id=?1 AND (?2 OR is_active=1) ORDER BY name COLLATE NOCASE",
            Account::COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![owner_id, include_inactive], Account::from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn update(&self, owner_id: i64, id: i64, upd: &AccountUpdate) -> Result<Account> {
        let tx = db::begin_write(self.conn)?;
        let mut acct = self.locked(owner_id, id)?;

        if let Some(name) = &upd.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(FinanceError::validation("name", "required"));
            }
            self.ensure_name_free(owner_id, name, Some(id))?;
            acct.name = name.to_string();
        }
        if let Some(desc) = &upd.description {
            acct.description = desc.clone();
        }
        if let Some(number) = &upd.account_number {
            acct.account_number = number.clone();
        }
        if let Some(limit) = upd.credit_limit {
            if limit.is_some() && !acct.is_credit_card() {
                return Err(FinanceError::validation(
                    "credit_limit",
                    "only_for_credit_cards",
                ));
            }
            if let Some(l) = limit {
                if l <= 0 {
                    return Err(FinanceError::validation("credit_limit", "must_be_positive"));
                }
                if l < acct.debt() {
                    return Err(FinanceError::validation(
                        "credit_limit",
                        "below_current_debt",
                    ));
                }
            }
            acct.credit_limit = limit;
        }
        if let Some(exempt) = upd.gmf_exempt {
            acct.gmf_exempt = exempt;
        }
        if let Some(active) = upd.is_active {
            if !active && acct.current_balance != 0 {
                return Err(FinanceError::conflict(
                    "cannot deactivate an account with a non-zero balance",
                ));
            }
            if active && !acct.is_active {
                self.ensure_capacity(owner_id)?;
            }
            acct.is_active = active;
        }

        tx.execute(
            "UPDATE accounts SET name=?1, description=?2, account_number=?3, credit_limit=?4,
                gmf_exempt=?5, is_active=?6, updated_at=datetime('now')
             WHERE id=?7",
            params![
                acct.name,
                acct.description,
                acct.account_number,
                acct.credit_limit,
                acct.gmf_exempt,
                acct.is_active,
                id,
            ],
        )?;
        tx.commit()?;
        tracing::info!(owner_id, id, "account updated");
        self.get(owner_id, id)
    }

    /// Apply a signed delta under the account lock.
    pub fn apply_delta(&self, owner_id: i64, id: i64, delta: i64) -> Result<Account> {
        let tx = db::begin_write(self.conn)?;
        let acct = self.locked(owner_id, id)?;
        validation::check_projection(&acct, delta, 0)?;
        db::store_balance(&tx, id, acct.current_balance + delta)?;
        tx.commit()?;
        tracing::info!(owner_id, id, delta, "balance delta applied");
        self.get(owner_id, id)
    }

    /// Manual correction outside the posting engine. The sign and credit-limit
    /// invariants still hold, and an audit row is kept.
    pub fn adjust_balance(
        &self,
        owner_id: i64,
        id: i64,
        new_balance: i64,
        reason: Option<&str>,
    ) -> Result<Account> {
        let tx = db::begin_write(self.conn)?;
        let acct = self.locked(owner_id, id)?;
        validation::check_balance_at_rest(&acct, new_balance)?;
        db::store_balance(&tx, id, new_balance)?;
        tx.execute(
            "INSERT INTO balance_adjustments(account_id, previous_balance, new_balance, reason)
             VALUES (?1, ?2, ?3, ?4)",
            params![id, acct.current_balance, new_balance, reason],
        )?;
        tx.commit()?;
        tracing::info!(
            owner_id,
            id,
            previous = acct.current_balance,
            new_balance,
            "balance adjusted"
        );
        self.get(owner_id, id)
    }

    pub fn adjustments(&self, owner_id: i64, id: i64) -> Result<Vec<BalanceAdjustment>> {
        self.get(owner_id, id)?;
        let mut stmt = self.conn.prepare(
            "SELECT id, account_id, previous_balance, new_balance, reason, created_at
             FROM balance_adjustments WHERE account_id=?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![id], |r| {
            Ok(BalanceAdjustment {
                id: r.get(0)?,
                account_id: r.get(1)?,
                previous_balance: r.get(2)?,
                new_balance: r.get(3)?,
                reason: r.get(4)?,
                created_at: r.get(5)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Soft delete. The balance must already be zero.
    pub fn deactivate(&self, owner_id: i64, id: i64) -> Result<Account> {
        self.update(
            owner_id,
            id,
            &AccountUpdate {
                is_active: Some(false),
                ..AccountUpdate::default()
            },
        )
    }

    /// Hard delete, refused while the account carries a balance or history.
    pub fn delete(&self, owner_id: i64, id: i64) -> Result<()> {
        let tx = db::begin_write(self.conn)?;
        let acct = self.locked(owner_id, id)?;
        if acct.current_balance != 0 {
            return Err(FinanceError::conflict(
                "cannot delete an account with a non-zero balance",
            ));
        }
        let refs: i64 = tx.query_row(
            "SELECT (SELECT COUNT(*) FROM transactions
                     WHERE origin_account_id=?1 OR destination_account_id=?1)
                  + (SELECT COUNT(*) FROM installment_plans WHERE credit_card_account_id=?1)",
            params![id],
            |r| r.get(0),
        )?;
        if refs > 0 {
            return Err(FinanceError::conflict(
                "cannot delete an account referenced by transactions",
            ));
        }
        tx.execute("DELETE FROM accounts WHERE id=?1", params![id])?;
        tx.commit()?;
        tracing::info!(owner_id, id, "account deleted");
        Ok(())
    }

    fn locked(&self, owner_id: i64, id: i64) -> Result<Account> {
        let mut map = db::lock_accounts(self.conn, owner_id, &[id])?;
        map.remove(&id).ok_or(FinanceError::NotFound {
            entity: "account",
            id,
        })
    }

    fn ensure_name_free(&self, owner_id: i64, name: &str, except: Option<i64>) -> Result<()> {
        let clash: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM accounts WHERE owner_id=?1 AND name=?2 COLLATE NOCASE",
                params![owner_id, name],
                |r| r.get(0),
            )
            .optional()?;
        match clash {
            Some(other) if Some(other) != except => {
                Err(FinanceError::validation("name", "duplicate"))
            }
            _ => Ok(()),
        }
    }

    fn ensure_capacity(&self, owner_id: i64) -> Result<()> {
        let active: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM accounts WHERE owner_id=?1 AND is_active=1",
            params![owner_id],
            |r| r.get(0),
        )?;
        if active >= i64::from(self.config.account_limit_per_user) {
            return Err(FinanceError::conflict(format!(
                "account limit of {} reached",
                self.config.account_limit_per_user
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceAdjustment {
    pub id: i64,
    pub account_id: i64,
    pub previous_balance: i64,
    pub new_balance: i64,
    pub reason: Option<String>,
    pub created_at: String,
}
