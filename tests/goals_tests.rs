// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::NaiveDate;
use ledgerline::models::{AccountCategory, AccountType, CategoryKind, TransactionKind};
use ledgerline::services::{GoalUpdate, NewAccount, TransactionSpec};
use ledgerline::{FinanceError, Ledger};

fn setup() -> (Ledger, i64) {
    let ledger = Ledger::in_memory().unwrap();
    let bank = ledger
        .accounts()
        .create(
            1,
            &NewAccount::new("Bank", AccountType::Asset, AccountCategory::Bank, "COP")
                .opening_balance(500_000),
        )
        .unwrap()
        .id;
    (ledger, bank)
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 5, 1).unwrap()
}

#[test]
fn saving_moves_money_into_goal_without_gmf() {
    let (ledger, bank) = setup();
    let goal = ledger.goals().create(1, "Trip", "COP", 300_000).unwrap();
    let tx = ledger
        .transactions()
        .create(
            1,
            &TransactionSpec::new(TransactionKind::Saving, bank, today())
                .goal(goal.id)
                .base(100_000),
        )
        .unwrap();
    assert_eq!(tx.gmf_amount, 0);
    assert_eq!(tx.goal_id, Some(goal.id));

    let goal = ledger.goals().get(1, goal.id).unwrap();
    assert_eq!(goal.saved_amount, 100_000);
    assert_eq!(goal.remaining(), 200_000);
    assert_eq!(
        ledger.accounts().get(1, bank).unwrap().current_balance,
        400_000
    );
}

#[test]
fn editing_and_deleting_savings_follow_the_goal() {
    let (ledger, bank) = setup();
    let trip = ledger.goals().create(1, "Trip", "COP", 300_000).unwrap();
    let car = ledger.goals().create(1, "Car", "COP", 0).unwrap();
    let tx = ledger
        .transactions()
        .create(
            1,
            &TransactionSpec::new(TransactionKind::Saving, bank, today())
                .goal(trip.id)
                .base(50_000),
        )
        .unwrap();

    // moving the saving to another goal empties the first
    ledger
        .transactions()
        .update(
            1,
            tx.id,
            &TransactionSpec::new(TransactionKind::Saving, bank, today())
                .goal(car.id)
                .base(70_000),
        )
        .unwrap();
    assert_eq!(ledger.goals().get(1, trip.id).unwrap().saved_amount, 0);
    assert_eq!(ledger.goals().get(1, car.id).unwrap().saved_amount, 70_000);
    assert_eq!(ledger.accounts().get(1, bank).unwrap().current_balance, 430_000);

    ledger.transactions().delete(1, tx.id).unwrap();
    assert_eq!(ledger.goals().get(1, car.id).unwrap().saved_amount, 0);
    assert_eq!(ledger.accounts().get(1, bank).unwrap().current_balance, 500_000);
}

#[test]
fn saving_without_goal_only_debits_account() {
    let (ledger, bank) = setup();
    ledger
        .transactions()
        .create(
            1,
            &TransactionSpec::new(TransactionKind::Saving, bank, today()).base(10_000),
        )
        .unwrap();
    assert_eq!(ledger.accounts().get(1, bank).unwrap().current_balance, 490_000);
}

#[test]
fn goal_must_match_account_currency() {
    let (ledger, bank) = setup();
    let goal = ledger.goals().create(1, "Euro trip", "EUR", 1_000).unwrap();
    let err = ledger
        .transactions()
        .create(
            1,
            &TransactionSpec::new(TransactionKind::Saving, bank, today())
                .goal(goal.id)
                .base(100),
        )
        .unwrap_err();
    assert!(matches!(err, FinanceError::Validation { ref field, .. } if field == "goal_id"));
}

#[test]
fn goal_on_non_saving_is_rejected() {
    let (ledger, bank) = setup();
    let goal = ledger.goals().create(1, "Trip", "COP", 1_000).unwrap();
    let fees = ledger.categories().create(1, "Fees", CategoryKind::Expense).unwrap();
    let err = ledger
        .transactions()
        .create(
            1,
            &TransactionSpec::new(TransactionKind::Expense, bank, today())
                .category(fees.id)
                .goal(goal.id)
                .base(100),
        )
        .unwrap_err();
    assert!(matches!(err, FinanceError::Validation { ref code, .. } if code == "only_for_saving"));
}

#[test]
fn update_and_delete_rules() {
    let (ledger, bank) = setup();
    let goal = ledger.goals().create(1, "Trip", "COP", 1_000).unwrap();
    let renamed = ledger
        .goals()
        .update(
            1,
            goal.id,
            &GoalUpdate {
                name: Some("Beach".into()),
                target_amount: Some(5_000),
            },
        )
        .unwrap();
    assert_eq!(renamed.name, "Beach");
    assert_eq!(renamed.target_amount, 5_000);
    assert!(ledger
        .goals()
        .update(
            1,
            goal.id,
            &GoalUpdate {
                target_amount: Some(-1),
                ..GoalUpdate::default()
            }
        )
        .is_err());

    let tx = ledger
        .transactions()
        .create(
            1,
            &TransactionSpec::new(TransactionKind::Saving, bank, today())
                .goal(goal.id)
                .base(100),
        )
        .unwrap();
    assert!(matches!(
        ledger.goals().delete(1, goal.id),
        Err(FinanceError::Conflict { .. })
    ));
    ledger.transactions().delete(1, tx.id).unwrap();
    ledger.goals().delete(1, goal.id).unwrap();
    assert!(ledger.goals().list(1).unwrap().is_empty());
}

#[test]
fn goals_are_private() {
    let (ledger, _) = setup();
    let goal = ledger.goals().create(1, "Trip", "COP", 1_000).unwrap();
    assert!(matches!(
        ledger.goals().get(2, goal.id),
        Err(FinanceError::PermissionDenied { .. })
    ));
    assert!(ledger.goals().list(2).unwrap().is_empty());
    assert!(ledger.goals().create(1, "Bad", "XXX", 1).is_err());
}
