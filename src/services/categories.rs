// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::{FinanceError, Result};
use crate::models::{Category, CategoryKind};

pub struct Categories<'a> {
    conn: &'a Connection,
}

impl<'a> Categories<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn create(&self, owner_id: i64, name: &str, kind: CategoryKind) -> Result<Category> {
        let name = name.trim();
        if name.is_empty() {
            return Err(FinanceError::validation("name", "required"));
        }
        let taken: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM categories WHERE owner_id=?1 AND name=?2 COLLATE NOCASE",
                params![owner_id, name],
                |r| r.get(0),
            )
            .optional()?;
        if taken.is_some() {
            return Err(FinanceError::validation("name", "duplicate"));
        }
        self.conn.execute(
            "INSERT INTO categories(owner_id, name, kind) VALUES (?1, ?2, ?3)",
            params![owner_id, name, kind],
        )?;
        let id = self.conn.last_insert_rowid();
        tracing::info!(owner_id, id, name, %kind, "category created");
        self.get(owner_id, id)
    }

    pub fn get(&self, owner_id: i64, id: i64) -> Result<Category> {
        load_owned(self.conn, owner_id, id)
    }

    pub fn find_by_name(&self, owner_id: i64, name: &str) -> Result<Option<Category>> {
        let sql = format!(
            "SELECT {} FROM categories WHERE owner_id=?1 AND name=?2 COLLATE NOCASE",
            Category::COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![owner_id, name.trim()], Category::from_row)
            .optional()?)
    }

    pub fn list(&self, owner_id: i64, kind: Option<CategoryKind>) -> Result<Vec<Category>> {
        let sql = format!(
            "SELECT {} FROM categories WHERE owner_id=?1 AND (?2 IS NULL OR kind=?2) ORDER BY kind, name COLLATE NOCASE",
            Category::COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![owner_id, kind], Category::from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Remove a category nothing references.
    pub fn delete(&self, owner_id: i64, id: i64) -> Result<()> {
        load_owned(self.conn, owner_id, id)?;
        let refs: i64 = self.conn.query_row(
            "SELECT (SELECT COUNT(*) FROM transactions WHERE category_id=?1)
                  + (SELECT COUNT(*) FROM installment_plans WHERE financing_category_id=?1)",
            params![id],
            |r| r.get(0),
        )?;
        if refs > 0 {
            return Err(FinanceError::conflict("category is referenced by transactions or plans"));
        }
        self.conn
            .execute("DELETE FROM categories WHERE id=?1", params![id])?;
        tracing::info!(owner_id, id, "category deleted");
        Ok(())
    }
}

/// Fetch a category, failing with `PermissionDenied` when it belongs to someone else.
pub(crate) fn load_owned(conn: &Connection, owner_id: i64, id: i64) -> Result<Category> {
    let sql = format!("SELECT {} FROM categories WHERE id=?1", Category::COLUMNS);
    let cat = conn
        .query_row(&sql, params![id], Category::from_row)
        .optional()?
        .ok_or(FinanceError::NotFound {
            entity: "category",
            id,
        })?;
    if cat.owner_id != owner_id {
        return Err(FinanceError::PermissionDenied {
            entity: "category",
            id,
        });
    }
    Ok(cat)
}
