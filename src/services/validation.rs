// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Side-effect-free checks shared by the posting, installment and goal engines.
//!
//! Nothing in here touches the database: callers load the accounts, category
//! and goal under their write lock and hand snapshots in.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::config::Config;
use crate::errors::{FinanceError, Result};
use crate::models::{Account, Category, CategoryKind, Goal, Transaction, TransactionKind};
use crate::money::{self, normalize_currency};
use crate::services::postings::TransactionSpec;

const MAX_TAX_PERCENTAGE: i64 = 30;

/// Monetary decomposition of a posting, all in minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AmountBreakdown {
    pub base_amount: i64,
    pub tax_percentage: Option<Decimal>,
    pub taxed_amount: i64,
    pub gmf_amount: i64,
    pub total_amount: i64,
}

/// Derive base, VAT, levy and total from whichever of base/total the caller gave.
///
/// `gmf_rate` is `None` when the levy does not apply to this posting.
pub fn derive_amounts(
    base_amount: Option<i64>,
    total_amount: Option<i64>,
    tax_percentage: Option<Decimal>,
    gmf_rate: Option<Decimal>,
) -> Result<AmountBreakdown> {
    if let Some(pct) = tax_percentage {
        if pct < Decimal::ZERO || pct > Decimal::from(MAX_TAX_PERCENTAGE) {
            return Err(FinanceError::validation("tax_percentage", "out_of_range"));
        }
    }

    let (base, taxed) = match (base_amount, total_amount) {
        (Some(_), Some(_)) => {
            return Err(FinanceError::validation(
                "total_amount",
                "exclusive_with_base_amount",
            ));
        }
        (None, None) => {
            return Err(if tax_percentage.is_some() {
                FinanceError::validation("tax_percentage", "requires_base_or_total")
            } else {
                FinanceError::validation("base_amount", "required")
            });
        }
        (Some(base), None) => {
            if base < 0 {
                return Err(FinanceError::validation("base_amount", "negative"));
            }
            let taxed = match tax_percentage {
                Some(pct) => money::percent_of(base, pct)?,
                None => 0,
            };
            (base, taxed)
        }
        (None, Some(total)) => {
            if total < 0 {
                return Err(FinanceError::validation("total_amount", "negative"));
            }
            match tax_percentage {
                Some(pct) if !pct.is_zero() => {
                    let factor = Decimal::ONE + pct / Decimal::ONE_HUNDRED;
                    let base = money::divide(total, factor)?;
                    (base, total - base)
                }
                _ => (total, 0),
            }
        }
    };

    let taxable = base
        .checked_add(taxed)
        .ok_or_else(|| FinanceError::validation("base_amount", "out_of_range"))?;
    let gmf = match gmf_rate {
        Some(rate) => money::scale(taxable, rate)?,
        None => 0,
    };
    let total = taxable
        .checked_add(gmf)
        .ok_or_else(|| FinanceError::validation("total_amount", "out_of_range"))?;

    Ok(AmountBreakdown {
        base_amount: base,
        tax_percentage,
        taxed_amount: taxed,
        gmf_amount: gmf,
        total_amount: total,
    })
}

/// Whether the financial-transactions levy is charged on this flow.
pub fn gmf_applies(
    kind: TransactionKind,
    origin: &Account,
    destination: Option<&Account>,
) -> bool {
    matches!(kind, TransactionKind::Expense | TransactionKind::Transfer)
        && origin.is_asset()
        && !origin.gmf_exempt
        && !destination.is_some_and(|d| d.is_credit_card())
}

/// What a transaction does to balances, one variant per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Income {
        account: i64,
        category: i64,
    },
    Expense {
        account: i64,
        category: i64,
    },
    /// `capital` is set for card payments: only that part reaches the card.
    Transfer {
        from: i64,
        to: i64,
        capital: Option<i64>,
    },
    Saving {
        account: i64,
        goal: Option<i64>,
    },
}

impl Flow {
    /// Rebuild the flow of a stored transaction.
    pub fn of(tx: &Transaction) -> Result<Flow> {
        let missing = |field: &str| FinanceError::invariant(format!("stored transaction {} lacks {}", tx.id, field));
        Ok(match tx.kind {
            TransactionKind::Income => Flow::Income {
                account: tx.origin_account_id,
                category: tx.category_id.ok_or_else(|| missing("category_id"))?,
            },
            TransactionKind::Expense => Flow::Expense {
                account: tx.origin_account_id,
                category: tx.category_id.ok_or_else(|| missing("category_id"))?,
            },
            TransactionKind::Transfer => Flow::Transfer {
                from: tx.origin_account_id,
                to: tx
                    .destination_account_id
                    .ok_or_else(|| missing("destination_account_id"))?,
                capital: tx.capital_amount,
            },
            TransactionKind::Saving => Flow::Saving {
                account: tx.origin_account_id,
                goal: tx.goal_id,
            },
        })
    }

    pub fn kind(&self) -> TransactionKind {
        match self {
            Flow::Income { .. } => TransactionKind::Income,
            Flow::Expense { .. } => TransactionKind::Expense,
            Flow::Transfer { .. } => TransactionKind::Transfer,
            Flow::Saving { .. } => TransactionKind::Saving,
        }
    }

    /// `(account_id, signed delta)` pairs produced by posting `total`.
    pub fn posting_plan(&self, total: i64) -> Vec<(i64, i64)> {
        match *self {
            Flow::Income { account, .. } => vec![(account, total)],
            Flow::Expense { account, .. } => vec![(account, -total)],
            Flow::Transfer { from, to, capital } => {
                vec![(from, -total), (to, capital.unwrap_or(total))]
            }
            Flow::Saving { account, .. } => vec![(account, -total)],
        }
    }

    /// Goal movement, if any, produced by posting `total`.
    pub fn goal_delta(&self, total: i64) -> Option<(i64, i64)> {
        match *self {
            Flow::Saving {
                goal: Some(goal), ..
            } => Some((goal, total)),
            _ => None,
        }
    }
}

/// Snapshots a proposed transaction is validated against.
#[derive(Debug, Clone, Copy)]
pub struct PostingContext<'a> {
    pub origin: &'a Account,
    pub destination: Option<&'a Account>,
    pub category: Option<&'a Category>,
    pub goal: Option<&'a Goal>,
}

/// Switches only the installment engine sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostingOptions {
    /// How far above zero a credit-card destination may end (capital leg of an
    /// installment payment, bounded by the plan's rounding residual).
    pub allow_transient_cc_positive: Option<i64>,
    /// Leg of a credit-card payment; no levy is charged.
    pub card_payment: bool,
}

/// A validated transaction, ready to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepared {
    pub flow: Flow,
    pub amounts: AmountBreakdown,
    pub capital_amount: Option<i64>,
    pub interest_amount: Option<i64>,
    pub transaction_currency: String,
}

pub fn prepare(
    owner_id: i64,
    spec: &TransactionSpec,
    ctx: &PostingContext<'_>,
    config: &Config,
    opts: PostingOptions,
) -> Result<Prepared> {
    let flow = check_shape(owner_id, spec, ctx)?;
    let transaction_currency = check_currency(spec, ctx, config)?;

    let gmf_rate = if !opts.card_payment && gmf_applies(spec.kind, ctx.origin, ctx.destination) {
        Some(config.gmf_rate)
    } else {
        None
    };
    let amounts = derive_amounts(
        spec.base_amount,
        spec.total_amount,
        spec.tax_percentage,
        gmf_rate,
    )?;

    let (capital_amount, interest_amount) = match spec.capital_amount {
        Some(capital) => {
            if capital < 0 {
                return Err(FinanceError::validation("capital_amount", "negative"));
            }
            if capital > amounts.base_amount {
                return Err(FinanceError::validation(
                    "capital_amount",
                    "exceeds_base_amount",
                ));
            }
            (Some(capital), Some(amounts.base_amount - capital))
        }
        None => (None, None),
    };

    if !transaction_currency.eq(&ctx.origin.currency) {
        check_round_trip(spec, &amounts)?;
    }

    Ok(Prepared {
        flow,
        amounts,
        capital_amount,
        interest_amount,
        transaction_currency,
    })
}

fn check_shape(owner_id: i64, spec: &TransactionSpec, ctx: &PostingContext<'_>) -> Result<Flow> {
    let origin = ctx.origin;
    if origin.id != spec.origin_account_id || origin.owner_id != owner_id {
        return Err(FinanceError::PermissionDenied {
            entity: "account",
            id: spec.origin_account_id,
        });
    }
    if !origin.is_active {
        return Err(FinanceError::validation("origin_account_id", "inactive_account"));
    }
    if spec.kind != TransactionKind::Saving && spec.goal_id.is_some() {
        return Err(FinanceError::validation("goal_id", "only_for_saving"));
    }
    if spec.capital_amount.is_some() && spec.kind != TransactionKind::Transfer {
        return Err(FinanceError::validation("capital_amount", "only_for_transfer"));
    }

    match spec.kind {
        TransactionKind::Income | TransactionKind::Expense => {
            if spec.destination_account_id.is_some() {
                return Err(FinanceError::validation("destination_account_id", "not_allowed"));
            }
            let category = ctx
                .category
                .ok_or_else(|| FinanceError::validation("category_id", "required"))?;
            if Some(category.id) != spec.category_id || category.owner_id != owner_id {
                return Err(FinanceError::PermissionDenied {
                    entity: "category",
                    id: category.id,
                });
            }
            let wanted = if spec.kind == TransactionKind::Income {
                CategoryKind::Income
            } else {
                CategoryKind::Expense
            };
            if category.kind != wanted {
                return Err(FinanceError::validation("category_id", "kind_mismatch"));
            }
            Ok(if spec.kind == TransactionKind::Income {
                Flow::Income {
                    account: origin.id,
                    category: category.id,
                }
            } else {
                Flow::Expense {
                    account: origin.id,
                    category: category.id,
                }
            })
        }
        TransactionKind::Transfer => {
            if spec.category_id.is_some() {
                return Err(FinanceError::validation("category_id", "not_allowed"));
            }
            let dest_id = spec
                .destination_account_id
                .ok_or_else(|| FinanceError::validation("destination_account_id", "required"))?;
            if dest_id == origin.id {
                return Err(FinanceError::validation(
                    "destination_account_id",
                    "same_as_origin",
                ));
            }
            let dest = ctx
                .destination
                .filter(|d| d.id == dest_id)
                .ok_or(FinanceError::NotFound {
                    entity: "account",
                    id: dest_id,
                })?;
            if dest.owner_id != owner_id {
                return Err(FinanceError::PermissionDenied {
                    entity: "account",
                    id: dest_id,
                });
            }
            if !dest.is_active {
                return Err(FinanceError::validation(
                    "destination_account_id",
                    "inactive_account",
                ));
            }
            if !origin.is_asset() {
                return Err(FinanceError::validation(
                    "origin_account_id",
                    "liability_origin_not_allowed",
                ));
            }
            if dest.currency != origin.currency {
                return Err(FinanceError::validation(
                    "destination_account_id",
                    "currency_mismatch",
                ));
            }
            if spec.capital_amount.is_some() && !dest.is_credit_card() {
                return Err(FinanceError::validation(
                    "capital_amount",
                    "requires_credit_card_destination",
                ));
            }
            Ok(Flow::Transfer {
                from: origin.id,
                to: dest.id,
                capital: spec.capital_amount,
            })
        }
        TransactionKind::Saving => {
            if spec.destination_account_id.is_some() {
                return Err(FinanceError::validation("destination_account_id", "not_allowed"));
            }
            if spec.category_id.is_some() {
                return Err(FinanceError::validation("category_id", "not_allowed"));
            }
            if !origin.is_asset() {
                return Err(FinanceError::validation(
                    "origin_account_id",
                    "liability_origin_not_allowed",
                ));
            }
            let goal = match spec.goal_id {
                Some(goal_id) => {
                    let goal = ctx.goal.filter(|g| g.id == goal_id).ok_or(
                        FinanceError::NotFound {
                            entity: "goal",
                            id: goal_id,
                        },
                    )?;
                    if goal.owner_id != owner_id {
                        return Err(FinanceError::PermissionDenied {
                            entity: "goal",
                            id: goal_id,
                        });
                    }
                    if goal.currency != origin.currency {
                        return Err(FinanceError::validation("goal_id", "currency_mismatch"));
                    }
                    Some(goal.id)
                }
                None => None,
            };
            Ok(Flow::Saving {
                account: origin.id,
                goal,
            })
        }
    }
}

fn check_currency(
    spec: &TransactionSpec,
    ctx: &PostingContext<'_>,
    config: &Config,
) -> Result<String> {
    let account_ccy = &ctx.origin.currency;
    let tx_ccy = match spec.transaction_currency.as_deref() {
        Some(c) => normalize_currency(c)
            .map_err(|_| FinanceError::validation("transaction_currency", "invalid_code"))?,
        None => account_ccy.clone(),
    };

    if &tx_ccy == account_ccy {
        if spec.exchange_rate.is_some() || spec.original_amount.is_some() {
            return Err(FinanceError::validation(
                "exchange_rate",
                "only_for_foreign_currency",
            ));
        }
        return Ok(tx_ccy);
    }

    if !config.is_supported(&tx_ccy) {
        return Err(FinanceError::validation("transaction_currency", "unsupported"));
    }
    match spec.exchange_rate {
        None => return Err(FinanceError::validation("exchange_rate", "required")),
        Some(r) if r <= Decimal::ZERO => {
            return Err(FinanceError::validation("exchange_rate", "must_be_positive"));
        }
        Some(_) => {}
    }
    match spec.original_amount {
        None => return Err(FinanceError::validation("original_amount", "required")),
        Some(a) if a <= 0 => {
            return Err(FinanceError::validation("original_amount", "must_be_positive"));
        }
        Some(_) => {}
    }
    Ok(tx_ccy)
}

/// `original_amount × exchange_rate` must land within one minor unit of the
/// base amount, whichever way the amounts were entered.
fn check_round_trip(spec: &TransactionSpec, amounts: &AmountBreakdown) -> Result<()> {
    let (Some(original), Some(rate)) = (spec.original_amount, spec.exchange_rate) else {
        return Err(FinanceError::validation("exchange_rate", "required"));
    };
    let converted = money::scale(original, rate)?;
    if (converted - amounts.base_amount).abs() > 1 {
        return Err(FinanceError::validation(
            "exchange_rate",
            "does_not_match_amount",
        ));
    }
    Ok(())
}

/// Check that moving `account` by `delta` keeps it within its invariants.
///
/// A liability may end at most `max_positive` above zero; the credit limit
/// still applies.
pub fn check_projection(account: &Account, delta: i64, max_positive: i64) -> Result<()> {
    let projected = account
        .current_balance
        .checked_add(delta)
        .ok_or_else(|| FinanceError::validation("amount", "out_of_range"))?;

    if account.is_asset() {
        if projected < 0 {
            return Err(FinanceError::InsufficientFunds {
                account_id: account.id,
                available: account.current_balance,
                requested: -delta,
            });
        }
        return Ok(());
    }

    if delta < 0 && account.is_credit_card() {
        if let Some(limit) = account.credit_limit {
            if -projected > limit {
                return Err(FinanceError::CreditLimitExceeded {
                    account_id: account.id,
                    limit,
                    current_debt: account.debt(),
                    requested: -delta,
                });
            }
        }
    }
    if projected > max_positive.max(0) {
        return Err(FinanceError::invariant(format!(
            "liability account {} would end with positive balance {}",
            account.id, projected
        )));
    }
    Ok(())
}

/// At-rest invariants for a balance set directly (manual adjustment, opening balance).
pub fn check_balance_at_rest(account: &Account, balance: i64) -> Result<()> {
    if account.is_asset() && balance < 0 {
        return Err(FinanceError::invariant(format!(
            "asset account {} cannot hold negative balance {}",
            account.id, balance
        )));
    }
    if account.is_liability() && balance > 0 {
        return Err(FinanceError::invariant(format!(
            "liability account {} cannot hold positive balance {}",
            account.id, balance
        )));
    }
    if account.is_credit_card() {
        if let Some(limit) = account.credit_limit {
            let debt = (-balance).max(0);
            if debt > limit {
                return Err(FinanceError::CreditLimitExceeded {
                    account_id: account.id,
                    limit,
                    current_debt: account.debt(),
                    requested: debt - account.debt(),
                });
            }
        }
    }
    Ok(())
}
