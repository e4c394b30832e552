// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Credit-card installment plans.
//!
//! A plan turns one card purchase into N French-system installments. Paying an
//! installment posts a capital transfer into the card plus, when there is
//! interest, an expense in the plan's financing category. Editing an active
//! plan regenerates only the rows that are not yet paid.

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::config::{Config, Rounding};
use crate::db;
use crate::errors::{FinanceError, Result};
use crate::models::{
    CategoryKind, InstallmentPayment, InstallmentPlan, PaymentStatus, PlanStatus, Transaction,
    TransactionKind,
};
use crate::money;
use crate::services::categories;
use crate::services::postings::{Postings, TransactionSpec};
use crate::services::validation::PostingOptions;
use crate::utils::add_months;

const MAX_RATE_DECIMALS: u32 = 4;
/// Fifty years of monthly rows.
pub const MAX_INSTALLMENTS: u32 = 600;

/// One row of a freshly computed amortization table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AmortizationRow {
    pub installment_amount: i64,
    pub principal_amount: i64,
    pub interest_amount: i64,
    pub remaining_principal: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Amortization {
    pub installment_amount: i64,
    pub rows: Vec<AmortizationRow>,
}

impl Amortization {
    pub fn total_interest(&self) -> i64 {
        self.rows.iter().map(|r| r.interest_amount).sum()
    }

    pub fn total_amount(&self) -> i64 {
        self.rows.iter().map(|r| r.installment_amount).sum()
    }
}

/// Level French-system payment for `principal` over `periods` at `rate_pct` per period.
pub fn level_installment(
    principal: i64,
    rate_pct: Decimal,
    periods: u32,
    rounding: Rounding,
) -> Result<i64> {
    if periods == 0 {
        return Err(FinanceError::validation(
            "number_of_installments",
            "must_be_positive",
        ));
    }
    let r = rate_pct / Decimal::ONE_HUNDRED;
    if r.is_zero() {
        return money::round_with(
            Decimal::from(principal) / Decimal::from(periods),
            rounding.strategy(),
        );
    }

    // (1 + r)^-n by repeated division keeps every step inside Decimal's range.
    let growth = Decimal::ONE + r;
    let mut discount = Decimal::ONE;
    for _ in 0..periods {
        discount = discount
            .checked_div(growth)
            .ok_or_else(|| FinanceError::validation("interest_rate", "out_of_range"))?;
    }
    let denom = Decimal::ONE - discount;
    if denom <= Decimal::ZERO {
        return Err(FinanceError::validation("interest_rate", "out_of_range"));
    }
    let value = Decimal::from(principal)
        .checked_mul(r)
        .and_then(|v| v.checked_div(denom))
        .ok_or_else(|| FinanceError::validation("purchase_amount", "out_of_range"))?;
    money::round_with(value, rounding.strategy())
}

/// Full amortization table. Principal is clamped to what remains so the rows
/// always sum to `principal`; the last row absorbs any residual.
pub fn amortize(
    principal: i64,
    rate_pct: Decimal,
    periods: u32,
    rounding: Rounding,
) -> Result<Amortization> {
    if principal < 0 {
        return Err(FinanceError::validation("purchase_amount", "negative"));
    }
    check_count(periods)?;
    let installment = level_installment(principal, rate_pct, periods, rounding)?;
    let r = rate_pct / Decimal::ONE_HUNDRED;

    let mut remaining = principal;
    let mut rows = Vec::with_capacity(periods as usize);
    for i in 1..=periods {
        let interest = if r.is_zero() {
            0
        } else {
            money::round_with(Decimal::from(remaining) * r, rounding.strategy())?
        };
        let principal_part = if i == periods {
            remaining
        } else {
            (installment - interest).clamp(0, remaining)
        };
        remaining -= principal_part;
        rows.push(AmortizationRow {
            installment_amount: principal_part + interest,
            principal_amount: principal_part,
            interest_amount: interest,
            remaining_principal: remaining,
        });
    }
    Ok(Amortization {
        installment_amount: installment,
        rows,
    })
}

fn check_count(periods: u32) -> Result<()> {
    if periods == 0 {
        return Err(FinanceError::validation(
            "number_of_installments",
            "must_be_positive",
        ));
    }
    if periods > MAX_INSTALLMENTS {
        return Err(FinanceError::validation(
            "number_of_installments",
            "out_of_range",
        ));
    }
    Ok(())
}

fn check_terms(periods: u32, rate_pct: Decimal) -> Result<()> {
    check_count(periods)?;
    if rate_pct < Decimal::ZERO {
        return Err(FinanceError::validation("interest_rate", "negative"));
    }
    if rate_pct.normalize().scale() > MAX_RATE_DECIMALS {
        return Err(FinanceError::validation("interest_rate", "too_many_decimals"));
    }
    Ok(())
}

fn due_date(start: NaiveDate, installment_number: u32) -> Result<NaiveDate> {
    add_months(start, installment_number.saturating_sub(1))
        .ok_or_else(|| FinanceError::validation("start_date", "out_of_range"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleRow {
    pub installment_number: u32,
    pub due_date: NaiveDate,
    pub installment_amount: i64,
    pub principal_amount: i64,
    pub interest_amount: i64,
    pub remaining_principal: i64,
    pub status: PaymentStatus,
    pub payment_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schedule {
    pub plan_id: Option<i64>,
    pub purchase_amount: i64,
    pub installment_amount: i64,
    pub total_principal: i64,
    pub total_interest: i64,
    pub total_amount: i64,
    pub rows: Vec<ScheduleRow>,
}

/// Schedule a hypothetical plan without touching the store.
pub fn preview(
    purchase_amount: i64,
    number_of_installments: u32,
    interest_rate: Decimal,
    start_date: NaiveDate,
    rounding: Rounding,
) -> Result<Schedule> {
    check_terms(number_of_installments, interest_rate)?;
    let table = amortize(purchase_amount, interest_rate, number_of_installments, rounding)?;
    let rows = table
        .rows
        .iter()
        .zip(1u32..)
        .map(|(row, n)| {
            Ok(ScheduleRow {
                installment_number: n,
                due_date: due_date(start_date, n)?,
                installment_amount: row.installment_amount,
                principal_amount: row.principal_amount,
                interest_amount: row.interest_amount,
                remaining_principal: row.remaining_principal,
                status: PaymentStatus::Pending,
                payment_date: None,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Schedule {
        plan_id: None,
        purchase_amount,
        installment_amount: table.installment_amount,
        total_principal: purchase_amount,
        total_interest: table.total_interest(),
        total_amount: table.total_amount(),
        rows,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPlan {
    pub purchase_transaction_id: i64,
    pub number_of_installments: u32,
    pub interest_rate: Decimal,
    pub start_date: NaiveDate,
    pub financing_category_id: i64,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanUpdate {
    pub number_of_installments: Option<u32>,
    pub interest_rate: Option<Decimal>,
    pub start_date: Option<NaiveDate>,
    pub description: Option<String>,
}

/// Result of paying one installment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentReceipt {
    pub payment: InstallmentPayment,
    pub capital_transaction: Transaction,
    pub interest_transaction: Option<Transaction>,
    pub plan_status: PlanStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverdueInstallment {
    pub owner_id: i64,
    pub plan_id: i64,
    pub plan_description: String,
    pub days_overdue: i64,
    pub payment: InstallmentPayment,
}

pub struct InstallmentPlans<'a> {
    conn: &'a Connection,
    config: &'a Config,
}

impl<'a> InstallmentPlans<'a> {
    pub fn new(conn: &'a Connection, config: &'a Config) -> Self {
        Self { conn, config }
    }

    pub fn preview(
        &self,
        purchase_amount: i64,
        number_of_installments: u32,
        interest_rate: Decimal,
        start_date: NaiveDate,
    ) -> Result<Schedule> {
        preview(
            purchase_amount,
            number_of_installments,
            interest_rate,
            start_date,
            self.config.installment_rounding,
        )
    }

    pub fn create_from_purchase(&self, owner_id: i64, new: &NewPlan) -> Result<InstallmentPlan> {
        check_terms(new.number_of_installments, new.interest_rate)?;

        let tx = db::begin_write(self.conn)?;
        let postings = Postings::new(self.conn, self.config);
        let purchase = postings.get(owner_id, new.purchase_transaction_id)?;
        if purchase.kind != TransactionKind::Expense {
            return Err(FinanceError::validation(
                "purchase_transaction_id",
                "not_an_expense",
            ));
        }
        let card_id = purchase.origin_account_id;
        let accounts = db::lock_accounts(self.conn, owner_id, &[card_id])?;
        let card = accounts.get(&card_id).ok_or(FinanceError::NotFound {
            entity: "account",
            id: card_id,
        })?;
        if !card.is_credit_card() {
            return Err(FinanceError::validation(
                "purchase_transaction_id",
                "not_a_credit_card_purchase",
            ));
        }
        let financing = categories::load_owned(self.conn, owner_id, new.financing_category_id)?;
        if financing.kind != CategoryKind::Expense {
            return Err(FinanceError::validation(
                "financing_category_id",
                "not_an_expense_category",
            ));
        }
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM installment_plans WHERE purchase_transaction_id=?1",
                params![purchase.id],
                |r| r.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(FinanceError::conflict(
                "purchase already has an installment plan",
            ));
        }

        let rounding = self.config.installment_rounding;
        let table = amortize(
            purchase.total_amount,
            new.interest_rate,
            new.number_of_installments,
            rounding,
        )?;
        let description = new
            .description
            .clone()
            .or_else(|| purchase.description.clone())
            .unwrap_or_default();

        self.conn.execute(
            "INSERT INTO installment_plans(owner_id, credit_card_account_id, purchase_transaction_id,
                financing_category_id, description, purchase_amount, number_of_installments,
                interest_rate, installment_amount, total_interest, total_principal, total_amount,
                start_date, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                owner_id,
                card_id,
                purchase.id,
                financing.id,
                description,
                purchase.total_amount,
                new.number_of_installments,
                new.interest_rate.normalize().to_string(),
                table.installment_amount,
                table.total_interest(),
                purchase.total_amount,
                table.total_amount(),
                new.start_date,
                PlanStatus::Active,
            ],
        )?;
        let plan_id = self.conn.last_insert_rowid();
        for (row, n) in table.rows.iter().zip(1u32..) {
            self.insert_row(plan_id, n, due_date(new.start_date, n)?, row)?;
        }
        tx.commit()?;
        tracing::info!(
            owner_id,
            plan_id,
            purchase = purchase.id,
            installments = new.number_of_installments,
            installment_amount = table.installment_amount,
            "installment plan created"
        );
        self.get(owner_id, plan_id)
    }

    pub fn get(&self, owner_id: i64, plan_id: i64) -> Result<InstallmentPlan> {
        let sql = format!(
            "SELECT {} FROM installment_plans WHERE id=?1",
            InstallmentPlan::COLUMNS
        );
        let plan = self
            .conn
            .query_row(&sql, params![plan_id], InstallmentPlan::from_row)
            .optional()?
            .ok_or(FinanceError::NotFound {
                entity: "installment_plan",
                id: plan_id,
            })?;
        if plan.owner_id != owner_id {
            return Err(FinanceError::PermissionDenied {
                entity: "installment_plan",
                id: plan_id,
            });
        }
        Ok(plan)
    }

    pub fn list(&self, owner_id: i64, status: Option<PlanStatus>) -> Result<Vec<InstallmentPlan>> {
        let sql = format!(
            "SELECT {} FROM installment_plans WHERE owner_id=?1 AND (?2 IS NULL OR status=?2) ORDER BY start_date, id",
            InstallmentPlan::COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![owner_id, status], InstallmentPlan::from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Stored installment rows, ordered by number.
    pub fn payments(&self, owner_id: i64, plan_id: i64) -> Result<Vec<InstallmentPayment>> {
        self.get(owner_id, plan_id)?;
        self.rows(plan_id)
    }

    /// Read-only view of a plan's rows with statuses as observed on `as_of`.
    pub fn schedule(&self, owner_id: i64, plan_id: i64, as_of: NaiveDate) -> Result<Schedule> {
        let plan = self.get(owner_id, plan_id)?;
        let stored = self.rows(plan_id)?;
        let mut remaining = plan.purchase_amount;
        let rows = stored
            .iter()
            .map(|p| {
                remaining -= p.principal_amount;
                ScheduleRow {
                    installment_number: p.installment_number,
                    due_date: p.due_date,
                    installment_amount: p.installment_amount,
                    principal_amount: p.principal_amount,
                    interest_amount: p.interest_amount,
                    remaining_principal: remaining.max(0),
                    status: p.status_on(as_of),
                    payment_date: p.payment_date,
                }
            })
            .collect();
        Ok(Schedule {
            plan_id: Some(plan.id),
            purchase_amount: plan.purchase_amount,
            installment_amount: plan.installment_amount,
            total_principal: plan.total_principal,
            total_interest: plan.total_interest,
            total_amount: plan.total_amount,
            rows,
        })
    }

    /// Pay one installment from an asset account: capital transfer into the
    /// card, interest expense when due, and the row marked completed. All of
    /// it commits together or not at all.
    pub fn record_payment(
        &self,
        owner_id: i64,
        plan_id: i64,
        installment_number: u32,
        payment_date: NaiveDate,
        source_account_id: i64,
        notes: Option<&str>,
    ) -> Result<PaymentReceipt> {
        let tx = db::begin_write(self.conn)?;
        let plan = self.get(owner_id, plan_id)?;
        if plan.status == PlanStatus::Cancelled {
            return Err(FinanceError::conflict("plan is cancelled"));
        }
        let row = self.row(plan_id, installment_number)?;
        match row.status {
            PaymentStatus::Completed => {
                return Err(FinanceError::conflict("installment already paid"));
            }
            PaymentStatus::Cancelled => {
                return Err(FinanceError::conflict("installment is cancelled"));
            }
            PaymentStatus::Pending | PaymentStatus::Overdue => {}
        }

        let card_id = plan.credit_card_account_id;
        let accounts = db::lock_accounts(self.conn, owner_id, &[source_account_id, card_id])?;
        let (Some(source), Some(card)) = (accounts.get(&source_account_id), accounts.get(&card_id))
        else {
            return Err(FinanceError::NotFound {
                entity: "account",
                id: source_account_id,
            });
        };
        if source_account_id == card_id || !source.is_asset() {
            return Err(FinanceError::validation("source_account_id", "must_be_asset"));
        }
        if source.currency != card.currency {
            return Err(FinanceError::validation(
                "source_account_id",
                "currency_mismatch",
            ));
        }

        let label = format!(
            "Installment {}/{} - {}",
            installment_number, plan.number_of_installments, plan.description
        );
        let postings = Postings::new(self.conn, self.config);
        let capital_spec = TransactionSpec::new(TransactionKind::Transfer, source_account_id, payment_date)
            .destination(card_id)
            .base(row.principal_amount)
            .capital(row.principal_amount)
            .description(label.clone());
        let capital = postings.post(
            owner_id,
            &capital_spec,
            PostingOptions {
                allow_transient_cc_positive: Some(self.residual(&plan)?),
                card_payment: true,
            },
        )?;

        let interest = if row.interest_amount > 0 {
            let spec = TransactionSpec::new(TransactionKind::Expense, source_account_id, payment_date)
                .category(plan.financing_category_id)
                .base(row.interest_amount)
                .description(format!("{label} (interest)"));
            Some(postings.post(
                owner_id,
                &spec,
                PostingOptions {
                    allow_transient_cc_positive: None,
                    card_payment: true,
                },
            )?)
        } else {
            None
        };

        self.conn.execute(
            "UPDATE installment_payments SET status=?1, payment_date=?2, notes=?3,
                capital_transaction_id=?4, interest_transaction_id=?5
             WHERE id=?6",
            params![
                PaymentStatus::Completed,
                payment_date,
                notes,
                capital.id,
                interest.as_ref().map(|t| t.id),
                row.id,
            ],
        )?;
        let status = self.refresh_status(&plan)?;
        let payment = self.row(plan_id, installment_number)?;
        tx.commit()?;
        tracing::info!(
            owner_id,
            plan_id,
            installment_number,
            principal = row.principal_amount,
            interest = row.interest_amount,
            plan_status = %status,
            "installment paid"
        );
        Ok(PaymentReceipt {
            payment,
            capital_transaction: capital,
            interest_transaction: interest,
            plan_status: status,
        })
    }

    /// Edit an active plan. Paid rows are kept as they are; every unpaid row is
    /// replaced by a fresh schedule for the principal still owed.
    pub fn update(&self, owner_id: i64, plan_id: i64, upd: &PlanUpdate) -> Result<InstallmentPlan> {
        let tx = db::begin_write(self.conn)?;
        let plan = self.get(owner_id, plan_id)?;
        if plan.status != PlanStatus::Active {
            return Err(FinanceError::conflict("plan is not active"));
        }

        let periods = upd.number_of_installments.unwrap_or(plan.number_of_installments);
        let rate = upd.interest_rate.unwrap_or(plan.interest_rate);
        let start = upd.start_date.unwrap_or(plan.start_date);
        check_terms(periods, rate)?;

        let rows = self.rows(plan_id)?;
        let completed: Vec<&InstallmentPayment> = rows.iter().filter(|r| r.is_completed()).collect();
        if (periods as usize) < completed.len() {
            return Err(FinanceError::conflict("cannot reduce below paid count"));
        }

        let description = upd
            .description
            .clone()
            .unwrap_or_else(|| plan.description.clone());
        let reschedule = periods != plan.number_of_installments
            || rate != plan.interest_rate
            || start != plan.start_date;

        let mut installment_amount = plan.installment_amount;
        let mut status = plan.status;
        if reschedule {
            let paid_principal: i64 = completed.iter().map(|r| r.principal_amount).sum();
            let owed = (plan.purchase_amount - paid_principal).max(0);
            let future = periods - completed.len() as u32;
            if future == 0 && owed > 0 {
                return Err(FinanceError::conflict(
                    "no installments left for the remaining principal",
                ));
            }

            self.conn.execute(
                "DELETE FROM installment_payments WHERE plan_id=?1 AND status != ?2",
                params![plan_id, PaymentStatus::Completed],
            )?;
            if future > 0 {
                let table = amortize(owed, rate, future, self.config.installment_rounding)?;
                let taken: BTreeSet<u32> = completed.iter().map(|r| r.installment_number).collect();
                let numbers = (1u32..).filter(|n| !taken.contains(n));
                for (row, n) in table.rows.iter().zip(numbers) {
                    self.insert_row(plan_id, n, due_date(start, n)?, row)?;
                }
                installment_amount = table.installment_amount;
            } else {
                status = PlanStatus::Completed;
            }
        }

        let kept = self.rows(plan_id)?;
        let total_principal: i64 = kept.iter().map(|r| r.principal_amount).sum();
        let total_interest: i64 = kept.iter().map(|r| r.interest_amount).sum();
        let total_amount: i64 = kept.iter().map(|r| r.installment_amount).sum();

        self.conn.execute(
            "UPDATE installment_plans SET description=?1, number_of_installments=?2,
                interest_rate=?3, installment_amount=?4, total_interest=?5, total_principal=?6,
                total_amount=?7, start_date=?8, status=?9, updated_at=datetime('now')
             WHERE id=?10",
            params![
                description,
                periods,
                rate.normalize().to_string(),
                installment_amount,
                total_interest,
                total_principal,
                total_amount,
                start,
                status,
                plan_id,
            ],
        )?;
        tx.commit()?;
        tracing::info!(
            owner_id,
            plan_id,
            installments = periods,
            rescheduled = reschedule,
            kept_paid = completed.len(),
            "installment plan updated"
        );
        self.get(owner_id, plan_id)
    }

    /// Cancel an active plan. Unpaid rows become cancelled; no money moves.
    pub fn cancel(&self, owner_id: i64, plan_id: i64) -> Result<InstallmentPlan> {
        let tx = db::begin_write(self.conn)?;
        let plan = self.get(owner_id, plan_id)?;
        match plan.status {
            PlanStatus::Active => {}
            PlanStatus::Completed => return Err(FinanceError::conflict("plan is already completed")),
            PlanStatus::Cancelled => return Err(FinanceError::conflict("plan is already cancelled")),
        }
        let touched = self.conn.execute(
            "UPDATE installment_payments SET status=?1 WHERE plan_id=?2 AND status=?3",
            params![PaymentStatus::Cancelled, plan_id, PaymentStatus::Pending],
        )?;
        self.conn.execute(
            "UPDATE installment_plans SET status=?1, updated_at=datetime('now') WHERE id=?2",
            params![PlanStatus::Cancelled, plan_id],
        )?;
        tx.commit()?;
        tracing::info!(owner_id, plan_id, cancelled_rows = touched, "installment plan cancelled");
        self.get(owner_id, plan_id)
    }

    /// Pending installments of active plans whose due date is before `today`.
    ///
    /// Overdue is a read-time status, so the sweep only reports; running it
    /// twice returns the same rows.
    pub fn overdue_sweep(&self, owner_id: Option<i64>, today: NaiveDate) -> Result<Vec<OverdueInstallment>> {
        let cols = InstallmentPayment::COLUMNS
            .split(", ")
            .map(|c| format!("p.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {cols}, pl.owner_id, pl.description
             FROM installment_payments p
             JOIN installment_plans pl ON pl.id = p.plan_id
             WHERE p.status = ?1 AND p.due_date < ?2 AND pl.status = ?3
               AND (?4 IS NULL OR pl.owner_id = ?4)
             ORDER BY p.due_date, p.plan_id, p.installment_number"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![PaymentStatus::Pending, today, PlanStatus::Active, owner_id],
            |r| {
                let payment = InstallmentPayment::from_row(r)?;
                let owner: i64 = r.get(12)?;
                let description: String = r.get(13)?;
                Ok((payment, owner, description))
            },
        )?;
        let mut out = Vec::new();
        for row in rows {
            let (payment, owner, description) = row?;
            out.push(OverdueInstallment {
                owner_id: owner,
                plan_id: payment.plan_id,
                plan_description: description,
                days_overdue: (today - payment.due_date).num_days(),
                payment: InstallmentPayment {
                    status: payment.status_on(today),
                    ..payment
                },
            });
        }
        tracing::info!(count = out.len(), %today, "overdue sweep");
        Ok(out)
    }

    fn rows(&self, plan_id: i64) -> Result<Vec<InstallmentPayment>> {
        let sql = format!(
            "SELECT {} FROM installment_payments WHERE plan_id=?1 ORDER BY installment_number",
            InstallmentPayment::COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![plan_id], InstallmentPayment::from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn row(&self, plan_id: i64, installment_number: u32) -> Result<InstallmentPayment> {
        let sql = format!(
            "SELECT {} FROM installment_payments WHERE plan_id=?1 AND installment_number=?2",
            InstallmentPayment::COLUMNS
        );
        self.conn
            .query_row(&sql, params![plan_id, installment_number], InstallmentPayment::from_row)
            .optional()?
            .ok_or(FinanceError::NotFound {
                entity: "installment",
                id: i64::from(installment_number),
            })
    }

    fn insert_row(
        &self,
        plan_id: i64,
        installment_number: u32,
        due: NaiveDate,
        row: &AmortizationRow,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO installment_payments(plan_id, installment_number, due_date,
                installment_amount, principal_amount, interest_amount, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                plan_id,
                installment_number,
                due,
                row.installment_amount,
                row.principal_amount,
                row.interest_amount,
                PaymentStatus::Pending,
            ],
        )?;
        Ok(())
    }

    fn refresh_status(&self, plan: &InstallmentPlan) -> Result<PlanStatus> {
        let open: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM installment_payments WHERE plan_id=?1 AND status != ?2",
            params![plan.id, PaymentStatus::Completed],
            |r| r.get(0),
        )?;
        let status = if open == 0 {
            PlanStatus::Completed
        } else if plan.status == PlanStatus::Cancelled {
            PlanStatus::Cancelled
        } else {
            PlanStatus::Active
        };
        if status != plan.status {
            self.conn.execute(
                "UPDATE installment_plans SET status=?1, updated_at=datetime('now') WHERE id=?2",
                params![status, plan.id],
            )?;
        }
        Ok(status)
    }

    /// Rounding residual absorbed by the last scheduled row: how far its
    /// installment drifts from the level payment. A capital leg may leave the
    /// card this far above zero and no further.
    fn residual(&self, plan: &InstallmentPlan) -> Result<i64> {
        let last = self
            .rows(plan.id)?
            .into_iter()
            .filter(|r| r.status != PaymentStatus::Cancelled)
            .next_back();
        Ok(last.map_or(0, |r| (r.installment_amount - plan.installment_amount).abs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn zero_rate_splits_evenly() {
        let t = amortize(1_000, Decimal::ZERO, 3, Rounding::HalfUp).unwrap();
        assert_eq!(t.installment_amount, 333);
        let principal: Vec<i64> = t.rows.iter().map(|r| r.principal_amount).collect();
        assert_eq!(principal, vec![333, 333, 334]);
        assert_eq!(t.total_interest(), 0);
        assert_eq!(t.rows.last().unwrap().remaining_principal, 0);
    }

    #[test]
    fn french_schedule_sums_to_principal() {
        let t = amortize(1_200_000, d("2"), 12, Rounding::HalfUp).unwrap();
        assert_eq!(t.installment_amount, 113_472);
        assert_eq!(t.rows[0].interest_amount, 24_000);
        assert_eq!(t.rows[0].principal_amount, 89_472);
        let principal: i64 = t.rows.iter().map(|r| r.principal_amount).sum();
        assert_eq!(principal, 1_200_000);
        assert_eq!(
            t.total_amount(),
            principal + t.total_interest()
        );
        for r in &t.rows[..11] {
            assert_eq!(r.installment_amount, 113_472);
        }
    }

    #[test]
    fn tiny_principal_is_clamped() {
        let t = amortize(5, d("3.5"), 12, Rounding::HalfUp).unwrap();
        let principal: i64 = t.rows.iter().map(|r| r.principal_amount).sum();
        assert_eq!(principal, 5);
        assert!(t.rows.iter().all(|r| r.principal_amount >= 0));
    }

    #[test]
    fn single_installment_carries_one_period_of_interest() {
        let t = amortize(100_000, d("1.5"), 1, Rounding::HalfUp).unwrap();
        assert_eq!(t.rows.len(), 1);
        assert_eq!(t.rows[0].principal_amount, 100_000);
        assert_eq!(t.rows[0].interest_amount, 1_500);
        assert_eq!(t.installment_amount, 101_500);
    }

    #[test]
    fn long_schedules_do_not_overflow() {
        let t = amortize(i64::from(u32::MAX), d("9.9999"), MAX_INSTALLMENTS, Rounding::HalfUp).unwrap();
        let principal: i64 = t.rows.iter().map(|r| r.principal_amount).sum();
        assert_eq!(principal, i64::from(u32::MAX));
        assert!(amortize(1_000, Decimal::ZERO, MAX_INSTALLMENTS + 1, Rounding::HalfUp).is_err());
    }

    #[test]
    fn preview_dates_clamp_to_month_end() {
        let start = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
        let s = preview(300, 3, Decimal::ZERO, start, Rounding::HalfUp).unwrap();
        let dates: Vec<String> = s.rows.iter().map(|r| r.due_date.to_string()).collect();
        assert_eq!(dates, vec!["2025-01-31", "2025-02-28", "2025-03-31"]);
        assert!(preview(300, 0, Decimal::ZERO, start, Rounding::HalfUp).is_err());
        assert!(preview(300, 3, d("1.00001"), start, Rounding::HalfUp).is_err());
    }
}
