// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Savings goals. `saved_amount` only moves through SAVING postings.

use rusqlite::{Connection, OptionalExtension, params};

use crate::config::Config;
use crate::db;
use crate::errors::{FinanceError, Result};
use crate::models::Goal;
use crate::money::normalize_currency;

#[derive(Debug, Clone, Default)]
pub struct GoalUpdate {
    pub name: Option<String>,
    pub target_amount: Option<i64>,
}

pub struct Goals<'a> {
    conn: &'a Connection,
    config: &'a Config,
}

impl<'a> Goals<'a> {
    pub fn new(conn: &'a Connection, config: &'a Config) -> Self {
        Self { conn, config }
    }

    pub fn create(
        &self,
        owner_id: i64,
        name: &str,
        currency: &str,
        target_amount: i64,
    ) -> Result<Goal> {
        let name = name.trim();
        if name.is_empty() {
            return Err(FinanceError::validation("name", "required"));
        }
        let currency = normalize_currency(currency)?;
        if !self.config.is_supported(&currency) {
            return Err(FinanceError::validation("currency", "unsupported"));
        }
        if target_amount < 0 {
            return Err(FinanceError::validation("target_amount", "negative"));
        }
        self.conn.execute(
            "INSERT INTO goals(owner_id, name, currency, target_amount) VALUES (?1, ?2, ?3, ?4)",
            params![owner_id, name, currency, target_amount],
        )?;
        let id = self.conn.last_insert_rowid();
        tracing::info!(owner_id, id, name, target_amount, "goal created");
        self.get(owner_id, id)
    }

    pub fn get(&self, owner_id: i64, id: i64) -> Result<Goal> {
        load_owned(self.conn, owner_id, id)
    }

    pub fn list(&self, owner_id: i64) -> Result<Vec<Goal>> {
        let sql = format!(
            "SELECT {} FROM goals WHERE owner_id=?1 ORDER BY id",
            Goal::COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![owner_id], Goal::from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn update(&self, owner_id: i64, id: i64, upd: &GoalUpdate) -> Result<Goal> {
        let tx = db::begin_write(self.conn)?;
        let mut goal = load_owned(&tx, owner_id, id)?;
        if let Some(name) = &upd.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(FinanceError::validation("name", "required"));
            }
            goal.name = name.to_string();
        }
        if let Some(target) = upd.target_amount {
            if target < 0 {
                return Err(FinanceError::validation("target_amount", "negative"));
            }
            goal.target_amount = target;
        }
        tx.execute(
            "UPDATE goals SET name=?1, target_amount=?2 WHERE id=?3",
            params![goal.name, goal.target_amount, id],
        )?;
        tx.commit()?;
        Ok(goal)
    }

    /// Only empty goals that no transaction points at can go.
    pub fn delete(&self, owner_id: i64, id: i64) -> Result<()> {
        let tx = db::begin_write(self.conn)?;
        let goal = load_owned(&tx, owner_id, id)?;
        if goal.saved_amount != 0 {
            return Err(FinanceError::conflict("goal still holds savings"));
        }
        let refs: i64 = tx.query_row(
            "SELECT COUNT(*) FROM transactions WHERE goal_id=?1",
            params![id],
            |r| r.get(0),
        )?;
        if refs > 0 {
            return Err(FinanceError::conflict("goal is referenced by transactions"));
        }
        tx.execute("DELETE FROM goals WHERE id=?1", params![id])?;
        tx.commit()?;
        tracing::info!(owner_id, id, "goal deleted");
        Ok(())
    }
}

pub(crate) fn load_owned(conn: &Connection, owner_id: i64, id: i64) -> Result<Goal> {
    let sql = format!("SELECT {} FROM goals WHERE id=?1", Goal::COLUMNS);
    let goal = conn
        .query_row(&sql, params![id], Goal::from_row)
        .optional()?
        .ok_or(FinanceError::NotFound { entity: "goal", id })?;
    if goal.owner_id != owner_id {
        return Err(FinanceError::PermissionDenied { entity: "goal", id });
    }
    Ok(goal)
}

/// New saved amount after moving `goal` by `delta`; never negative.
pub fn accumulate(goal: &Goal, delta: i64) -> Result<i64> {
    let next = goal
        .saved_amount
        .checked_add(delta)
        .ok_or_else(|| FinanceError::validation("total_amount", "out_of_range"))?;
    if next < 0 {
        return Err(FinanceError::invariant(format!(
            "goal {} saved amount would become negative ({})",
            goal.id, next
        )));
    }
    Ok(next)
}

pub(crate) fn store_saved(conn: &Connection, goal_id: i64, saved: i64) -> Result<()> {
    conn.execute(
        "UPDATE goals SET saved_amount=?1 WHERE id=?2",
        params![saved, goal_id],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulate_refuses_negative() {
        let goal = Goal {
            id: 3,
            owner_id: 1,
            name: "Trip".into(),
            currency: "COP".into(),
            target_amount: 1_000,
            saved_amount: 200,
            created_at: String::new(),
        };
        assert_eq!(accumulate(&goal, 300).unwrap(), 500);
        assert_eq!(accumulate(&goal, -200).unwrap(), 0);
        assert!(matches!(
            accumulate(&goal, -201),
            Err(FinanceError::InvariantViolation { .. })
        ));
    }
}
