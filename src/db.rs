// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use directories::ProjectDirs;
use once_cell::sync::Lazy;
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{FinanceError, Result};
use crate::models::Account;

static APP: Lazy<(&str, &str, &str)> =
    Lazy::new(|| ("com.alphavelocity", "Ledgerline", "ledgerline"));

/// Environment variable that overrides the database location.
pub const DB_ENV: &str = "LEDGERLINE_DB";

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

pub fn db_path() -> anyhow::Result<PathBuf> {
    if let Ok(p) = std::env::var(DB_ENV) {
        if !p.trim().is_empty() {
            return Ok(PathBuf::from(p));
        }
    }
    let proj = ProjectDirs::from(APP.0, APP.1, APP.2)
        .ok_or_else(|| anyhow::anyhow!("Could not determine platform-specific data dir"))?;
    let data_dir = proj.data_dir();
    fs::create_dir_all(data_dir)?;
    Ok(data_dir.join("ledgerline.sqlite"))
}

pub fn open_or_init() -> anyhow::Result<Connection> {
    let path = db_path()?;
    Ok(open_at(&path)?)
}

/// Open (creating if needed) a file-backed store. Each thread should open its own connection.
pub fn open_at(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS settings(
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS user_settings(
        user_id INTEGER PRIMARY KEY,
        base_currency TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS accounts(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        account_number TEXT,
        type TEXT NOT NULL CHECK(type IN ('asset','liability')),
        category TEXT NOT NULL CHECK(category IN ('bank','savings','credit_card','wallet','other')),
        currency TEXT NOT NULL,
        current_balance INTEGER NOT NULL DEFAULT 0,
        credit_limit INTEGER CHECK(credit_limit IS NULL OR credit_limit > 0),
        gmf_exempt INTEGER NOT NULL DEFAULT 0,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now')),
        CHECK(category != 'credit_card' OR type = 'liability')
    );
    CREATE UNIQUE INDEX IF NOT EXISTS idx_accounts_owner_name
        ON accounts(owner_id, name COLLATE NOCASE);

    CREATE TABLE IF NOT EXISTS balance_adjustments(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        account_id INTEGER NOT NULL,
        previous_balance INTEGER NOT NULL,
        new_balance INTEGER NOT NULL,
        reason TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        FOREIGN KEY(account_id) REFERENCES accounts(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS categories(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        kind TEXT NOT NULL CHECK(kind IN ('income','expense'))
    );
    CREATE UNIQUE INDEX IF NOT EXISTS idx_categories_owner_name
        ON categories(owner_id, name COLLATE NOCASE);

    CREATE TABLE IF NOT EXISTS goals(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        currency TEXT NOT NULL,
        target_amount INTEGER NOT NULL CHECK(target_amount >= 0),
        saved_amount INTEGER NOT NULL DEFAULT 0 CHECK(saved_amount >= 0),
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE IF NOT EXISTS transactions(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner_id INTEGER NOT NULL,
        date TEXT NOT NULL,
        description TEXT,
        tag TEXT,
        note TEXT,
        kind INTEGER NOT NULL CHECK(kind IN (1,2,3,4)),
        origin_account_id INTEGER NOT NULL,
        destination_account_id INTEGER,
        category_id INTEGER,
        goal_id INTEGER,
        transaction_currency TEXT NOT NULL,
        original_amount INTEGER,
        exchange_rate TEXT,
        base_amount INTEGER NOT NULL CHECK(base_amount >= 0),
        tax_percentage TEXT,
        taxed_amount INTEGER NOT NULL DEFAULT 0 CHECK(taxed_amount >= 0),
        gmf_amount INTEGER NOT NULL DEFAULT 0 CHECK(gmf_amount >= 0),
        capital_amount INTEGER,
        interest_amount INTEGER,
        total_amount INTEGER NOT NULL CHECK(total_amount >= 0),
        applied_rule_id INTEGER,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now')),
        FOREIGN KEY(origin_account_id) REFERENCES accounts(id),
        FOREIGN KEY(destination_account_id) REFERENCES accounts(id),
        FOREIGN KEY(category_id) REFERENCES categories(id),
        FOREIGN KEY(goal_id) REFERENCES goals(id)
    );
    CREATE INDEX IF NOT EXISTS idx_transactions_owner_date ON transactions(owner_id, date);
    CREATE INDEX IF NOT EXISTS idx_transactions_origin ON transactions(origin_account_id);
    CREATE INDEX IF NOT EXISTS idx_transactions_destination ON transactions(destination_account_id);

    CREATE TABLE IF NOT EXISTS installment_plans(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner_id INTEGER NOT NULL,
        credit_card_account_id INTEGER NOT NULL,
        purchase_transaction_id INTEGER NOT NULL UNIQUE,
        financing_category_id INTEGER NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        purchase_amount INTEGER NOT NULL,
        number_of_installments INTEGER NOT NULL CHECK(number_of_installments >= 1),
        interest_rate TEXT NOT NULL,
        installment_amount INTEGER NOT NULL,
        total_interest INTEGER NOT NULL,
        total_principal INTEGER NOT NULL,
        total_amount INTEGER NOT NULL,
        start_date TEXT NOT NULL,
        status TEXT NOT NULL CHECK(status IN ('active','completed','cancelled')),
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now')),
        FOREIGN KEY(credit_card_account_id) REFERENCES accounts(id),
        FOREIGN KEY(purchase_transaction_id) REFERENCES transactions(id),
        FOREIGN KEY(financing_category_id) REFERENCES categories(id)
    );

    -- overdue is derived on read and never stored
    CREATE TABLE IF NOT EXISTS installment_payments(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        plan_id INTEGER NOT NULL,
        installment_number INTEGER NOT NULL,
        due_date TEXT NOT NULL,
        installment_amount INTEGER NOT NULL,
        principal_amount INTEGER NOT NULL,
        interest_amount INTEGER NOT NULL,
        status TEXT NOT NULL CHECK(status IN ('pending','completed','cancelled')),
        payment_date TEXT,
        notes TEXT,
        capital_transaction_id INTEGER,
        interest_transaction_id INTEGER,
        UNIQUE(plan_id, installment_number),
        FOREIGN KEY(plan_id) REFERENCES installment_plans(id) ON DELETE CASCADE,
        FOREIGN KEY(capital_transaction_id) REFERENCES transactions(id),
        FOREIGN KEY(interest_transaction_id) REFERENCES transactions(id)
    );

    -- one row per (base, quote, month); 1 quote = rate base
    CREATE TABLE IF NOT EXISTS exchange_rates(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        base TEXT NOT NULL,
        quote TEXT NOT NULL,
        year INTEGER NOT NULL,
        month INTEGER NOT NULL CHECK(month BETWEEN 1 AND 12),
        rate TEXT NOT NULL,
        source TEXT NOT NULL DEFAULT 'manual',
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        UNIQUE(base, quote, year, month)
    );
    "#,
    )?;
    Ok(())
}

/// Start a write transaction that holds the database write lock until commit.
///
/// Every read of a balance that feeds a write decision happens after this
/// returns, so concurrent postings serialize here.
pub fn begin_write(conn: &Connection) -> Result<Transaction<'_>> {
    Ok(Transaction::new_unchecked(
        conn,
        TransactionBehavior::Immediate,
    )?)
}

/// Load the given accounts inside the current write transaction, in
/// ascending id order, checking ownership.
pub fn lock_accounts(
    conn: &Connection,
    owner_id: i64,
    ids: &[i64],
) -> Result<BTreeMap<i64, Account>> {
    let mut ordered: Vec<i64> = ids.to_vec();
    ordered.sort_unstable();
    ordered.dedup();
    tracing::debug!(?ordered, "locking accounts");

    let sql = format!("SELECT {} FROM accounts WHERE id=?1", Account::COLUMNS);
    let mut stmt = conn.prepare_cached(&sql)?;
    let mut out = BTreeMap::new();
    for id in ordered {
        let acct = stmt
            .query_row(params![id], Account::from_row)
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
        out.insert(id, acct);
    }
    Ok(out)
}

/// Overwrite an account balance. Callers hold the write lock and have already
/// checked the invariants for `new_balance`.
pub fn store_balance(conn: &Connection, account_id: i64, new_balance: i64) -> Result<()> {
    conn.execute(
        "UPDATE accounts SET current_balance=?1, updated_at=datetime('now') WHERE id=?2",
        params![new_balance, account_id],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent() {
        let conn = open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='installment_payments'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(n, 1);
    }

    #[test]
    fn credit_cards_must_be_liabilities() {
        let conn = open_in_memory().unwrap();
        let res = conn.execute(
            "INSERT INTO accounts(owner_id, name, type, category, currency) VALUES (1,'Visa','asset','credit_card','COP')",
            [],
        );
        assert!(res.is_err());
    }

    #[test]
    fn lock_accounts_checks_owner_and_existence() {
        let conn = open_in_memory().unwrap();
        conn.execute(
            "INSERT INTO accounts(id, owner_id, name, type, category, currency) VALUES (5,1,'Bank','asset','bank','COP')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO accounts(id, owner_id, name, type, category, currency) VALUES (2,1,'Cash','asset','wallet','COP')",
            [],
        )
        .unwrap();
        let tx = begin_write(&conn).unwrap();
        let locked = lock_accounts(&tx, 1, &[5, 2, 5]).unwrap();
        assert_eq!(locked.keys().copied().collect::<Vec<_>>(), vec![2, 5]);
        assert!(matches!(
            lock_accounts(&tx, 2, &[5]),
            Err(FinanceError::PermissionDenied { .. })
        ));
        assert!(matches!(
            lock_accounts(&tx, 1, &[99]),
            Err(FinanceError::NotFound { .. })
        ));
    }
}
