// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::NaiveDate;
use rusqlite::Row;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{FinanceError, Result};

/// Text-backed enums: `as_str`/`parse`, `Display`, and SQLite round-tripping.
macro_rules! text_enum {
    ($name:ident, $field:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }

            pub fn parse(s: &str) -> Result<Self> {
                match s.trim().to_lowercase().replace('-', "_").as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(FinanceError::validation($field, "unknown_value")),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let s = value.as_str()?;
                $name::parse(s).map_err(|e| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Asset,
    Liability,
}

text_enum!(AccountType, "type", { Asset => "asset", Liability => "liability" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountCategory {
    Bank,
    Savings,
    CreditCard,
    Wallet,
    Other,
}

text_enum!(AccountCategory, "category", {
    Bank => "bank",
    Savings => "savings",
    CreditCard => "credit_card",
    Wallet => "wallet",
    Other => "other",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub description: String,
    pub account_number: Option<String>,
    pub account_type: AccountType,
    pub category: AccountCategory,
    pub currency: String,
    pub current_balance: i64,
    pub credit_limit: Option<i64>,
    pub gmf_exempt: bool,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Account {
    pub const COLUMNS: &'static str = "id, owner_id, name, description, account_number, type, category, currency, current_balance, credit_limit, gmf_exempt, is_active, created_at, updated_at";

    pub fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Account {
            id: r.get(0)?,
            owner_id: r.get(1)?,
            name: r.get(2)?,
            description: r.get(3)?,
            account_number: r.get(4)?,
            account_type: r.get(5)?,
            category: r.get(6)?,
            currency: r.get(7)?,
            current_balance: r.get(8)?,
            credit_limit: r.get(9)?,
            gmf_exempt: r.get(10)?,
            is_active: r.get(11)?,
            created_at: r.get(12)?,
            updated_at: r.get(13)?,
        })
    }

    pub fn is_asset(&self) -> bool {
        self.account_type == AccountType::Asset
    }

    pub fn is_liability(&self) -> bool {
        self.account_type == AccountType::Liability
    }

    pub fn is_credit_card(&self) -> bool {
        self.category == AccountCategory::CreditCard
    }

    /// Outstanding debt as a non-negative number (liabilities only).
    pub fn debt(&self) -> i64 {
        if self.is_liability() {
            (-self.current_balance).max(0)
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryKind {
    Income,
    Expense,
}

text_enum!(CategoryKind, "kind", { Income => "income", Expense => "expense" });

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub kind: CategoryKind,
}

impl Category {
    pub const COLUMNS: &'static str = "id, owner_id, name, kind";

    pub fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Category {
            id: r.get(0)?,
            owner_id: r.get(1)?,
            name: r.get(2)?,
            kind: r.get(3)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Income = 1,
    Expense = 2,
    Transfer = 3,
    Saving = 4,
}

impl TransactionKind {
    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            1 => Ok(TransactionKind::Income),
            2 => Ok(TransactionKind::Expense),
            3 => Ok(TransactionKind::Transfer),
            4 => Ok(TransactionKind::Saving),
            _ => Err(FinanceError::validation("kind", "unknown_value")),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Income => "income",
            TransactionKind::Expense => "expense",
            TransactionKind::Transfer => "transfer",
            TransactionKind::Saving => "saving",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "income" | "1" => Ok(TransactionKind::Income),
            "expense" | "2" => Ok(TransactionKind::Expense),
            "transfer" | "3" => Ok(TransactionKind::Transfer),
            "saving" | "4" => Ok(TransactionKind::Saving),
            _ => Err(FinanceError::validation("kind", "unknown_value")),
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for TransactionKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code()))
    }
}

impl FromSql for TransactionKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let code = value.as_i64()?;
        TransactionKind::from_code(code).map_err(|_| FromSqlError::OutOfRange(code))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub owner_id: i64,
    pub date: NaiveDate,
    pub description: Option<String>,
    pub tag: Option<String>,
    pub note: Option<String>,
    pub kind: TransactionKind,
    pub origin_account_id: i64,
    pub destination_account_id: Option<i64>,
    pub category_id: Option<i64>,
    pub goal_id: Option<i64>,
    pub transaction_currency: String,
    pub original_amount: Option<i64>,
    pub exchange_rate: Option<Decimal>,
    pub base_amount: i64,
    pub tax_percentage: Option<Decimal>,
    pub taxed_amount: i64,
    pub gmf_amount: i64,
    pub capital_amount: Option<i64>,
    pub interest_amount: Option<i64>,
    pub total_amount: i64,
    pub applied_rule_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

impl Transaction {
    pub const COLUMNS: &'static str = "t.id, t.owner_id, t.date, t.description, t.tag, t.note, t.kind, t.origin_account_id, t.destination_account_id, t.category_id, t.goal_id, t.transaction_currency, t.original_amount, t.exchange_rate, t.base_amount, t.tax_percentage, t.taxed_amount, t.gmf_amount, t.capital_amount, t.interest_amount, t.total_amount, t.applied_rule_id, t.created_at, t.updated_at";

    pub fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Transaction {
            id: r.get(0)?,
            owner_id: r.get(1)?,
            date: r.get(2)?,
            description: r.get(3)?,
            tag: r.get(4)?,
            note: r.get(5)?,
            kind: r.get(6)?,
            origin_account_id: r.get(7)?,
            destination_account_id: r.get(8)?,
            category_id: r.get(9)?,
            goal_id: r.get(10)?,
            transaction_currency: r.get(11)?,
            original_amount: r.get(12)?,
            exchange_rate: opt_decimal_col(r, 13)?,
            base_amount: r.get(14)?,
            tax_percentage: opt_decimal_col(r, 15)?,
            taxed_amount: r.get(16)?,
            gmf_amount: r.get(17)?,
            capital_amount: r.get(18)?,
            interest_amount: r.get(19)?,
            total_amount: r.get(20)?,
            applied_rule_id: r.get(21)?,
            created_at: r.get(22)?,
            updated_at: r.get(23)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub currency: String,
    pub target_amount: i64,
    pub saved_amount: i64,
    pub created_at: String,
}

impl Goal {
    pub const COLUMNS: &'static str =
        "id, owner_id, name, currency, target_amount, saved_amount, created_at";

    pub fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Goal {
            id: r.get(0)?,
            owner_id: r.get(1)?,
            name: r.get(2)?,
            currency: r.get(3)?,
            target_amount: r.get(4)?,
            saved_amount: r.get(5)?,
            created_at: r.get(6)?,
        })
    }

    pub fn remaining(&self) -> i64 {
        (self.target_amount - self.saved_amount).max(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Active,
    Completed,
    Cancelled,
}

text_enum!(PlanStatus, "status", {
    Active => "active",
    Completed => "completed",
    Cancelled => "cancelled",
});

/// Installment status. `Overdue` is never stored; it is derived from the due
/// date when a pending row is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Overdue,
    Cancelled,
}

text_enum!(PaymentStatus, "status", {
    Pending => "pending",
    Completed => "completed",
    Overdue => "overdue",
    Cancelled => "cancelled",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallmentPlan {
    pub id: i64,
    pub owner_id: i64,
    pub credit_card_account_id: i64,
    pub purchase_transaction_id: i64,
    pub financing_category_id: i64,
    pub description: String,
    pub purchase_amount: i64,
    pub number_of_installments: u32,
    pub interest_rate: Decimal,
    pub installment_amount: i64,
    pub total_interest: i64,
    pub total_principal: i64,
    pub total_amount: i64,
    pub start_date: NaiveDate,
    pub status: PlanStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl InstallmentPlan {
    pub const COLUMNS: &'static str = "id, owner_id, credit_card_account_id, purchase_transaction_id, financing_category_id, description, purchase_amount, number_of_installments, interest_rate, installment_amount, total_interest, total_principal, total_amount, start_date, status, created_at, updated_at";

    pub fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(InstallmentPlan {
            id: r.get(0)?,
            owner_id: r.get(1)?,
            credit_card_account_id: r.get(2)?,
            purchase_transaction_id: r.get(3)?,
            financing_category_id: r.get(4)?,
            description: r.get(5)?,
            purchase_amount: r.get(6)?,
            number_of_installments: r.get(7)?,
            interest_rate: decimal_col(r, 8)?,
            installment_amount: r.get(9)?,
            total_interest: r.get(10)?,
            total_principal: r.get(11)?,
            total_amount: r.get(12)?,
            start_date: r.get(13)?,
            status: r.get(14)?,
            created_at: r.get(15)?,
            updated_at: r.get(16)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallmentPayment {
    pub id: i64,
    pub plan_id: i64,
    pub installment_number: u32,
    pub due_date: NaiveDate,
    pub installment_amount: i64,
    pub principal_amount: i64,
    pub interest_amount: i64,
    pub status: PaymentStatus,
    pub payment_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub capital_transaction_id: Option<i64>,
    pub interest_transaction_id: Option<i64>,
}

impl InstallmentPayment {
    pub const COLUMNS: &'static str = "id, plan_id, installment_number, due_date, installment_amount, principal_amount, interest_amount, status, payment_date, notes, capital_transaction_id, interest_transaction_id";

    pub fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(InstallmentPayment {
            id: r.get(0)?,
            plan_id: r.get(1)?,
            installment_number: r.get(2)?,
            due_date: r.get(3)?,
            installment_amount: r.get(4)?,
            principal_amount: r.get(5)?,
            interest_amount: r.get(6)?,
            status: r.get(7)?,
            payment_date: r.get(8)?,
            notes: r.get(9)?,
            capital_transaction_id: r.get(10)?,
            interest_transaction_id: r.get(11)?,
        })
    }

    /// Status as observed on `today`: a pending row past its due date reads as overdue.
    pub fn status_on(&self, today: NaiveDate) -> PaymentStatus {
        match self.status {
            PaymentStatus::Pending if self.due_date < today => PaymentStatus::Overdue,
            other => other,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == PaymentStatus::Completed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub id: i64,
    pub base: String,
    pub quote: String,
    pub year: i32,
    pub month: u32,
    pub rate: Decimal,
    pub source: String,
}

impl ExchangeRate {
    pub const COLUMNS: &'static str = "id, base, quote, year, month, rate, source";

    pub fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(ExchangeRate {
            id: r.get(0)?,
            base: r.get(1)?,
            quote: r.get(2)?,
            year: r.get(3)?,
            month: r.get(4)?,
            rate: decimal_col(r, 5)?,
            source: r.get(6)?,
        })
    }

    /// `YYYY-MM` label of the month this rate covers.
    pub fn period(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }
}

// Decimals are stored as TEXT to keep every digit.
fn decimal_col(r: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let s: String = r.get(idx)?;
    Decimal::from_str(&s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn opt_decimal_col(r: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let s: Option<String> = r.get(idx)?;
    match s {
        Some(s) => Decimal::from_str(&s).map(Some).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_enums_parse_loosely() {
        assert_eq!(
            AccountCategory::parse("Credit-Card").unwrap(),
            AccountCategory::CreditCard
        );
        assert_eq!(AccountType::parse(" ASSET ").unwrap(), AccountType::Asset);
        assert!(PlanStatus::parse("paused").is_err());
    }

    #[test]
    fn transaction_kind_codes() {
        assert_eq!(TransactionKind::Saving.code(), 4);
        assert_eq!(TransactionKind::from_code(3).unwrap(), TransactionKind::Transfer);
        assert!(TransactionKind::from_code(9).is_err());
        assert_eq!(TransactionKind::parse("2").unwrap(), TransactionKind::Expense);
    }

    #[test]
    fn pending_rows_read_as_overdue_after_due_date() {
        let row = InstallmentPayment {
            id: 1,
            plan_id: 1,
            installment_number: 1,
            due_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            installment_amount: 10,
            principal_amount: 10,
            interest_amount: 0,
            status: PaymentStatus::Pending,
            payment_date: None,
            notes: None,
            capital_transaction_id: None,
            interest_transaction_id: None,
        };
        let jan1 = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let jan2 = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        assert_eq!(row.status_on(jan1), PaymentStatus::Pending);
        assert_eq!(row.status_on(jan2), PaymentStatus::Overdue);

        let paid = InstallmentPayment {
            status: PaymentStatus::Completed,
            ..row
        };
        assert_eq!(paid.status_on(jan2), PaymentStatus::Completed);
    }
}
