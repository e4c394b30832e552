// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Transaction posting engine.
//!
//! Every create, update and delete runs inside one write transaction. The
//! affected accounts are loaded in ascending id order after the write lock is
//! taken, the proposed deltas are checked against those snapshots, and only
//! then are balances, goals and the transaction row written.

use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::Config;
use crate::db;
use crate::errors::{FinanceError, Result};
use crate::models::{Account, Category, Goal, Transaction, TransactionKind};
use crate::services::validation::{self, Flow, PostingContext, PostingOptions, Prepared};
use crate::services::{categories, goals};

/// A proposed transaction. Exactly one of `base_amount`/`total_amount` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSpec {
    pub kind: TransactionKind,
    pub origin_account_id: i64,
    pub destination_account_id: Option<i64>,
    pub category_id: Option<i64>,
    pub goal_id: Option<i64>,
    pub date: NaiveDate,
    pub base_amount: Option<i64>,
    pub total_amount: Option<i64>,
    pub tax_percentage: Option<Decimal>,
    pub capital_amount: Option<i64>,
    pub transaction_currency: Option<String>,
    pub exchange_rate: Option<Decimal>,
    pub original_amount: Option<i64>,
    pub description: Option<String>,
    pub tag: Option<String>,
    pub note: Option<String>,
    pub applied_rule_id: Option<i64>,
}

impl TransactionSpec {
    pub fn new(kind: TransactionKind, origin_account_id: i64, date: NaiveDate) -> Self {
        Self {
            kind,
            origin_account_id,
            destination_account_id: None,
            category_id: None,
            goal_id: None,
            date,
            base_amount: None,
            total_amount: None,
            tax_percentage: None,
            capital_amount: None,
            transaction_currency: None,
            exchange_rate: None,
            original_amount: None,
            description: None,
            tag: None,
            note: None,
            applied_rule_id: None,
        }
    }

    pub fn base(mut self, amount: i64) -> Self {
        self.base_amount = Some(amount);
        self
    }

    pub fn total(mut self, amount: i64) -> Self {
        self.total_amount = Some(amount);
        self
    }

    pub fn tax(mut self, pct: Decimal) -> Self {
        self.tax_percentage = Some(pct);
        self
    }

    pub fn destination(mut self, account_id: i64) -> Self {
        self.destination_account_id = Some(account_id);
        self
    }

    pub fn category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn goal(mut self, goal_id: i64) -> Self {
        self.goal_id = Some(goal_id);
        self
    }

    pub fn capital(mut self, amount: i64) -> Self {
        self.capital_amount = Some(amount);
        self
    }

    /// Foreign-currency purchase: `original_amount × exchange_rate` must match the posted amount.
    pub fn foreign(mut self, currency: &str, exchange_rate: Decimal, original_amount: i64) -> Self {
        self.transaction_currency = Some(currency.to_string());
        self.exchange_rate = Some(exchange_rate);
        self.original_amount = Some(original_amount);
        self
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn tag(mut self, text: impl Into<String>) -> Self {
        self.tag = Some(text.into());
        self
    }

    pub fn note(mut self, text: impl Into<String>) -> Self {
        self.note = Some(text.into());
        self
    }

    pub fn rule(mut self, rule_id: i64) -> Self {
        self.applied_rule_id = Some(rule_id);
        self
    }

    fn account_ids(&self) -> Vec<i64> {
        let mut ids = vec![self.origin_account_id];
        ids.extend(self.destination_account_id);
        ids
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionOrder {
    DateAsc,
    #[default]
    DateDesc,
    TotalAsc,
    TotalDesc,
}

impl TransactionOrder {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "date" | "date_asc" => Ok(TransactionOrder::DateAsc),
            "date_desc" => Ok(TransactionOrder::DateDesc),
            "total" | "total_asc" | "total_amount" => Ok(TransactionOrder::TotalAsc),
            "total_desc" => Ok(TransactionOrder::TotalDesc),
            _ => Err(FinanceError::validation("order_by", "unknown_value")),
        }
    }

    fn sql(&self) -> &'static str {
        match self {
            TransactionOrder::DateAsc => "t.date ASC, t.id ASC",
            TransactionOrder::DateDesc => "t.date DESC, t.id DESC",
            TransactionOrder::TotalAsc => "t.total_amount ASC, t.id ASC",
            TransactionOrder::TotalDesc => "t.total_amount DESC, t.id DESC",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    pub kind: Option<TransactionKind>,
    pub origin_account_id: Option<i64>,
    pub destination_account_id: Option<i64>,
    pub category_id: Option<i64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub min_total: Option<i64>,
    pub max_total: Option<i64>,
    /// Case-insensitive match on description, note, tag or category name.
    pub text: Option<String>,
    pub order_by: TransactionOrder,
    pub limit: Option<usize>,
}

/// Pending balance and goal movements for one write, checked before anything is stored.
struct Workset {
    accounts: BTreeMap<i64, Account>,
    deltas: BTreeMap<i64, i64>,
    goals: BTreeMap<i64, Goal>,
    goal_deltas: BTreeMap<i64, i64>,
}

impl Workset {
    fn new(accounts: BTreeMap<i64, Account>) -> Self {
        Self {
            accounts,
            deltas: BTreeMap::new(),
            goals: BTreeMap::new(),
            goal_deltas: BTreeMap::new(),
        }
    }

    fn account(&self, id: i64) -> Result<&Account> {
        self.accounts.get(&id).ok_or(FinanceError::NotFound {
            entity: "account",
            id,
        })
    }

    fn add(&mut self, flow: &Flow, total: i64, sign: i64) -> Result<()> {
        for (account_id, delta) in flow.posting_plan(total) {
            let slot = self.deltas.entry(account_id).or_insert(0);
            *slot = slot
                .checked_add(sign * delta)
                .ok_or_else(|| FinanceError::validation("total_amount", "out_of_range"))?;
        }
        if let Some((goal_id, delta)) = flow.goal_delta(total) {
            *self.goal_deltas.entry(goal_id).or_insert(0) += sign * delta;
        }
        Ok(())
    }

    fn load_goal(&mut self, conn: &Connection, owner_id: i64, goal_id: i64) -> Result<()> {
        if !self.goals.contains_key(&goal_id) {
            let goal = goals::load_owned(conn, owner_id, goal_id)?;
            self.goals.insert(goal_id, goal);
        }
        Ok(())
    }

    /// Check every projected balance. `tolerate` names a credit card and how far
    /// above zero it may end.
    fn check(&self, tolerate: Option<(i64, i64)>) -> Result<()> {
        for (&account_id, &delta) in &self.deltas {
            if delta == 0 {
                continue;
            }
            let account = self.account(account_id)?;
            let max_positive = match tolerate {
                Some((card_id, max)) if card_id == account_id => max,
                _ => 0,
            };
            validation::check_projection(account, delta, max_positive)?;
        }
        for (&goal_id, &delta) in &self.goal_deltas {
            let goal = self.goals.get(&goal_id).ok_or(FinanceError::NotFound {
                entity: "goal",
                id: goal_id,
            })?;
            goals::accumulate(goal, delta)?;
        }
        Ok(())
    }

    fn commit(&self, conn: &Connection) -> Result<()> {
        for (&account_id, &delta) in &self.deltas {
            if delta == 0 {
                continue;
            }
            let account = self.account(account_id)?;
            db::store_balance(conn, account_id, account.current_balance + delta)?;
        }
        for (&goal_id, &delta) in &self.goal_deltas {
            if delta == 0 {
                continue;
            }
            if let Some(goal) = self.goals.get(&goal_id) {
                goals::store_saved(conn, goal_id, goal.saved_amount + delta)?;
            }
        }
        Ok(())
    }
}

pub struct Postings<'a> {
    conn: &'a Connection,
    config: &'a Config,
}

impl<'a> Postings<'a> {
    pub fn new(conn: &'a Connection, config: &'a Config) -> Self {
        Self { conn, config }
    }

    pub fn create(&self, owner_id: i64, spec: &TransactionSpec) -> Result<Transaction> {
        let tx = db::begin_write(self.conn)?;
        let created = self.post(owner_id, spec, PostingOptions::default())?;
        tx.commit()?;
        Ok(created)
    }

    /// Validate and apply `spec` inside the caller's write transaction.
    pub(crate) fn post(
        &self,
        owner_id: i64,
        spec: &TransactionSpec,
        opts: PostingOptions,
    ) -> Result<Transaction> {
        let accounts = db::lock_accounts(self.conn, owner_id, &spec.account_ids())?;
        let mut work = Workset::new(accounts);
        if let Some(goal_id) = spec.goal_id {
            work.load_goal(self.conn, owner_id, goal_id)?;
        }
        let category = self.category_for(owner_id, spec)?;
        let prepared = self.prepare(owner_id, spec, &work, category.as_ref(), opts)?;

        work.add(&prepared.flow, prepared.amounts.total_amount, 1)?;
        work.check(tolerated_card(&prepared.flow, &work, opts))?;

        let id = self.insert(owner_id, spec, &prepared)?;
        work.commit(self.conn)?;
        tracing::info!(
            owner_id,
            id,
            kind = %spec.kind,
            total = prepared.amounts.total_amount,
            "transaction posted"
        );
        self.load(owner_id, id)
    }

    pub fn get(&self, owner_id: i64, id: i64) -> Result<Transaction> {
        self.load(owner_id, id)
    }

    /// Reverse the stored transaction and apply `spec` in its place.
    pub fn update(&self, owner_id: i64, id: i64, spec: &TransactionSpec) -> Result<Transaction> {
        let tx = db::begin_write(self.conn)?;
        let old = self.load(owner_id, id)?;
        self.ensure_unlinked(&old)?;
        let old_flow = Flow::of(&old)?;

        let mut ids = spec.account_ids();
        ids.push(old.origin_account_id);
        ids.extend(old.destination_account_id);
        let accounts = db::lock_accounts(self.conn, owner_id, &ids)?;
        let mut work = Workset::new(accounts);
        for goal_id in old.goal_id.into_iter().chain(spec.goal_id) {
            work.load_goal(self.conn, owner_id, goal_id)?;
        }
        work.add(&old_flow, old.total_amount, -1)?;

        let category = self.category_for(owner_id, spec)?;
        let prepared = self.prepare(owner_id, spec, &work, category.as_ref(), PostingOptions::default())?;
        work.add(&prepared.flow, prepared.amounts.total_amount, 1)?;
        work.check(None)?;

        self.rewrite(id, spec, &prepared)?;
        work.commit(self.conn)?;
        tx.commit()?;
        tracing::info!(
            owner_id,
            id,
            old_total = old.total_amount,
            new_total = prepared.amounts.total_amount,
            "transaction updated"
        );
        self.load(owner_id, id)
    }

    pub fn delete(&self, owner_id: i64, id: i64) -> Result<()> {
        let tx = db::begin_write(self.conn)?;
        let old = self.load(owner_id, id)?;
        self.ensure_unlinked(&old)?;
        let flow = Flow::of(&old)?;

        let mut ids = vec![old.origin_account_id];
        ids.extend(old.destination_account_id);
        let accounts = db::lock_accounts(self.conn, owner_id, &ids)?;
        let mut work = Workset::new(accounts);
        if let Some(goal_id) = old.goal_id {
            work.load_goal(self.conn, owner_id, goal_id)?;
        }
        work.add(&flow, old.total_amount, -1)?;
        work.check(None)?;

        work.commit(self.conn)?;
        self.conn
            .execute("DELETE FROM transactions WHERE id=?1", params![id])?;
        tx.commit()?;
        tracing::info!(owner_id, id, total = old.total_amount, "transaction deleted");
        Ok(())
    }

    pub fn list(&self, owner_id: i64, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        let mut sql = format!(
            "SELECT {} FROM transactions t LEFT JOIN categories c ON c.id = t.category_id WHERE t.owner_id = ?",
            Transaction::COLUMNS
        );
        let mut args: Vec<Value> = vec![Value::Integer(owner_id)];

        if let Some(kind) = filter.kind {
            sql.push_str(" AND t.kind = ?");
            args.push(Value::Integer(kind.code()));
        }
        if let Some(id) = filter.origin_account_id {
            sql.push_str(" AND t.origin_account_id = ?");
            args.push(Value::Integer(id));
        }
        if let Some(id) = filter.destination_account_id {
            sql.push_str(" AND t.destination_account_id = ?");
            args.push(Value::Integer(id));
        }
        if let Some(id) = filter.category_id {
            sql.push_str(" AND t.category_id = ?");
            args.push(Value::Integer(id));
        }
        if let Some(from) = filter.from {
            sql.push_str(" AND t.date >= ?");
            args.push(Value::Text(from.to_string()));
        }
        if let Some(to) = filter.to {
            sql.push_str(" AND t.date <= ?");
            args.push(Value::Text(to.to_string()));
        }
        if let Some(min) = filter.min_total {
            sql.push_str(" AND t.total_amount >= ?");
            args.push(Value::Integer(min));
        }
        if let Some(max) = filter.max_total {
            sql.push_str(" AND t.total_amount <= ?");
            args.push(Value::Integer(max));
        }
        if let Some(text) = filter.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            sql.push_str(
                " AND (t.description LIKE ? OR t.note LIKE ? OR t.tag LIKE ? OR c.name LIKE ?)",
            );
            let pattern = format!("%{}%", text);
            for _ in 0..4 {
                args.push(Value::Text(pattern.clone()));
            }
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(filter.order_by.sql());
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            args.push(Value::Integer(limit as i64));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args), Transaction::from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn load(&self, owner_id: i64, id: i64) -> Result<Transaction> {
        let sql = format!(
            "SELECT {} FROM transactions t WHERE t.id=?1",
            Transaction::COLUMNS
        );
        let found = self
            .conn
            .query_row(&sql, params![id], Transaction::from_row)
            .optional()?
            .ok_or(FinanceError::NotFound {
                entity: "transaction",
                id,
            })?;
        if found.owner_id != owner_id {
            return Err(FinanceError::PermissionDenied {
                entity: "transaction",
                id,
            });
        }
        Ok(found)
    }

    /// Plan purchases and installment legs are owned by the installment engine.
    fn ensure_unlinked(&self, tx: &Transaction) -> Result<()> {
        let linked: i64 = self.conn.query_row(
            "SELECT (SELECT COUNT(*) FROM installment_plans WHERE purchase_transaction_id=?1)
                  + (SELECT COUNT(*) FROM installment_payments
                     WHERE capital_transaction_id=?1 OR interest_transaction_id=?1)",
            params![tx.id],
            |r| r.get(0),
        )?;
        if linked > 0 {
            return Err(FinanceError::conflict(
                "transaction is linked to an installment plan",
            ));
        }
        Ok(())
    }

    fn category_for(&self, owner_id: i64, spec: &TransactionSpec) -> Result<Option<Category>> {
        spec.category_id
            .map(|id| categories::load_owned(self.conn, owner_id, id))
            .transpose()
    }

    fn prepare(
        &self,
        owner_id: i64,
        spec: &TransactionSpec,
        work: &Workset,
        category: Option<&Category>,
        opts: PostingOptions,
    ) -> Result<Prepared> {
        let origin = work.account(spec.origin_account_id)?;
        let destination = spec
            .destination_account_id
            .map(|id| work.account(id))
            .transpose()?;
        let goal = spec.goal_id.and_then(|id| work.goals.get(&id));
        let ctx = PostingContext {
            origin,
            destination,
            category,
            goal,
        };
        validation::prepare(owner_id, spec, &ctx, self.config, opts).inspect_err(|e| {
            tracing::debug!(owner_id, kind = %spec.kind, error = %e, "posting rejected");
        })
    }

    fn insert(&self, owner_id: i64, spec: &TransactionSpec, p: &Prepared) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO transactions(owner_id, date, description, tag, note, kind,
                origin_account_id, destination_account_id, category_id, goal_id,
                transaction_currency, original_amount, exchange_rate, base_amount,
                tax_percentage, taxed_amount, gmf_amount, capital_amount, interest_amount,
                total_amount, applied_rule_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)",
            params![
                owner_id,
                spec.date,
                spec.description,
                spec.tag,
                spec.note,
                spec.kind,
                spec.origin_account_id,
                spec.destination_account_id,
                spec.category_id,
                spec.goal_id,
                p.transaction_currency,
                spec.original_amount,
                spec.exchange_rate.map(|d| d.to_string()),
                p.amounts.base_amount,
                p.amounts.tax_percentage.map(|d| d.to_string()),
                p.amounts.taxed_amount,
                p.amounts.gmf_amount,
                p.capital_amount,
                p.interest_amount,
                p.amounts.total_amount,
                spec.applied_rule_id,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn rewrite(&self, id: i64, spec: &TransactionSpec, p: &Prepared) -> Result<()> {
        self.conn.execute(
            "UPDATE transactions SET date=?1, description=?2, tag=?3, note=?4, kind=?5,
                origin_account_id=?6, destination_account_id=?7, category_id=?8, goal_id=?9,
                transaction_currency=?10, original_amount=?11, exchange_rate=?12, base_amount=?13,
                tax_percentage=?14, taxed_amount=?15, gmf_amount=?16, capital_amount=?17,
                interest_amount=?18, total_amount=?19, applied_rule_id=?20,
                updated_at=datetime('now')
             WHERE id=?21",
            params![
                spec.date,
                spec.description,
                spec.tag,
                spec.note,
                spec.kind,
                spec.origin_account_id,
                spec.destination_account_id,
                spec.category_id,
                spec.goal_id,
                p.transaction_currency,
                spec.original_amount,
                spec.exchange_rate.map(|d| d.to_string()),
                p.amounts.base_amount,
                p.amounts.tax_percentage.map(|d| d.to_string()),
                p.amounts.taxed_amount,
                p.amounts.gmf_amount,
                p.capital_amount,
                p.interest_amount,
                p.amounts.total_amount,
                spec.applied_rule_id,
                id,
            ],
        )?;
        Ok(())
    }
}

fn tolerated_card(flow: &Flow, work: &Workset, opts: PostingOptions) -> Option<(i64, i64)> {
    let max_positive = opts.allow_transient_cc_positive?;
    match *flow {
        Flow::Transfer { to, .. } => work
            .accounts
            .get(&to)
            .filter(|a| a.is_credit_card())
            .map(|a| (a.id, max_positive)),
        _ => None,
    }
}
