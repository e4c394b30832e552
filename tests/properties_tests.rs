// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Seeded random walks over the posting and installment engines, checking
//! the ledger invariants after every step.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use ledgerline::commands::doctor;
use ledgerline::config::Rounding;
use ledgerline::models::{AccountCategory, AccountType, CategoryKind, TransactionKind};
use ledgerline::services::installments::amortize;
use ledgerline::services::validation::{Flow, derive_amounts};
use ledgerline::services::{NewAccount, TransactionFilter, TransactionSpec};
use ledgerline::{FinanceError, Ledger};
use rand::rngs::SmallRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;

fn pick<T: Copy>(rng: &mut SmallRng, items: &[T]) -> T {
    *items.choose(rng).unwrap()
}

struct World {
    ledger: Ledger,
    accounts: Vec<i64>,
    assets: Vec<i64>,
    card: i64,
    income: i64,
    expense: i64,
    goal: i64,
    opening: BTreeMap<i64, i64>,
}

fn world() -> World {
    let ledger = Ledger::in_memory().unwrap();
    let mut opening = BTreeMap::new();
    let mut mk = |acct: NewAccount| {
        let a = ledger.accounts().create(1, &acct).unwrap();
        opening.insert(a.id, a.current_balance);
        a.id
    };
    let bank = mk(
        NewAccount::new("Bank", AccountType::Asset, AccountCategory::Bank, "COP")
            .opening_balance(2_000_000),
    );
    let savings = mk(
        NewAccount::new("Savings", AccountType::Asset, AccountCategory::Savings, "COP")
            .opening_balance(300_000)
            .gmf_exempt(true),
    );
    let cash = mk(NewAccount::new("Cash", AccountType::Asset, AccountCategory::Wallet, "COP"));
    let card = mk(
        NewAccount::new("Visa", AccountType::Liability, AccountCategory::CreditCard, "COP")
            .opening_balance(-100_000)
            .credit_limit(800_000),
    );
    let income = ledger.categories().create(1, "Salary", CategoryKind::Income).unwrap().id;
    let expense = ledger.categories().create(1, "Food", CategoryKind::Expense).unwrap().id;
    let goal = ledger.goals().create(1, "Rainy day", "COP", 1_000_000).unwrap().id;
    World {
        ledger,
        accounts: vec![bank, savings, cash, card],
        assets: vec![bank, savings, cash],
        card,
        income,
        expense,
        goal,
        opening,
    }
}

fn random_spec(w: &World, rng: &mut SmallRng) -> TransactionSpec {
    let date = NaiveDate::from_ymd_opt(2025, rng.random_range(1..=12), rng.random_range(1..=28))
        .unwrap();
    let amount: i64 = rng.random_range(1..=250_000);
    let tax = if rng.random_ratio(1, 3) {
        Some(Decimal::from(pick(rng, &[5i64, 19])))
    } else {
        None
    };
    let kind = pick(rng, &[
        TransactionKind::Income,
        TransactionKind::Expense,
        TransactionKind::Transfer,
        TransactionKind::Saving,
    ]);
    let origin = match kind {
        TransactionKind::Income | TransactionKind::Expense => pick(rng, &w.accounts),
        _ => pick(rng, &w.assets),
    };
    let mut spec = TransactionSpec::new(kind, origin, date);
    spec = if rng.random_bool(0.5) {
        spec.base(amount)
    } else {
        spec.total(amount)
    };
    if let Some(t) = tax {
        spec = spec.tax(t);
    }
    match kind {
        TransactionKind::Income => spec.category(w.income),
        TransactionKind::Expense => spec.category(w.expense),
        TransactionKind::Transfer => {
            let dest = pick(rng, &w.accounts);
            let spec = spec.destination(dest);
            if dest == w.card && tax.is_none() && spec.base_amount.is_some() && rng.random_bool(0.5) {
                spec.capital(amount / 2)
            } else {
                spec
            }
        }
        TransactionKind::Saving => {
            if rng.random_ratio(1, 4) {
                spec
            } else {
                spec.goal(w.goal)
            }
        }
    }
}

fn balances(w: &World) -> BTreeMap<i64, i64> {
    w.accounts
        .iter()
        .map(|&id| (id, w.ledger.accounts().get(1, id).unwrap().current_balance))
        .collect()
}

/// Opening balances plus the replay of every stored transaction.
fn replayed(w: &World) -> BTreeMap<i64, i64> {
    let mut out = w.opening.clone();
    let txs = w
        .ledger
        .transactions()
        .list(1, &TransactionFilter::default())
        .unwrap();
    for tx in txs {
        for (id, delta) in Flow::of(&tx).unwrap().posting_plan(tx.total_amount) {
            *out.entry(id).or_insert(0) += delta;
        }
    }
    out
}

fn assert_invariants(w: &World, step: usize) {
    let findings = doctor::run(w.ledger.conn(), w.ledger.config()).unwrap();
    assert!(findings.is_empty(), "step {step}: {findings:?}");
    assert_eq!(balances(w), replayed(w), "step {step}: balances drifted from history");
}

fn expect_domain_error(err: FinanceError, step: usize) {
    assert!(
        !matches!(err, FinanceError::Database(_)),
        "step {step}: unexpected database error {err}"
    );
}

#[test]
fn random_postings_keep_invariants() {
    for seed in [7u64, 42, 2025] {
        let w = world();
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut live: Vec<i64> = Vec::new();
        for step in 0..250 {
            let before = balances(&w);
            let op = rng.random_range(0..10);
            let outcome = if op < 6 || live.is_empty() {
                w.ledger
                    .transactions()
                    .create(1, &random_spec(&w, &mut rng))
                    .map(|tx| live.push(tx.id))
            } else if op < 8 {
                let id = pick(&mut rng, &live);
                w.ledger
                    .transactions()
                    .update(1, id, &random_spec(&w, &mut rng))
                    .map(|_| ())
            } else {
                let idx = rng.random_range(0..live.len());
                let id = live[idx];
                w.ledger
                    .transactions()
                    .delete(1, id)
                    .map(|_| {
                        live.swap_remove(idx);
                    })
            };
            if let Err(err) = outcome {
                expect_domain_error(err, step);
                assert_eq!(balances(&w), before, "step {step}: rejected op changed balances");
            }
            assert_invariants(&w, step);
        }
    }
}

#[test]
fn create_then_delete_is_neutral() {
    let w = world();
    let mut rng = SmallRng::seed_from_u64(99);
    let mut accepted = 0;
    for step in 0..200 {
        let before = balances(&w);
        let goal_before = w.ledger.goals().get(1, w.goal).unwrap().saved_amount;
        match w.ledger.transactions().create(1, &random_spec(&w, &mut rng)) {
            Ok(tx) => {
                accepted += 1;
                assert_eq!(
                    tx.base_amount + tx.taxed_amount + tx.gmf_amount,
                    tx.total_amount,
                    "step {step}"
                );
                w.ledger.transactions().delete(1, tx.id).unwrap();
            }
            Err(err) => expect_domain_error(err, step),
        }
        assert_eq!(balances(&w), before, "step {step}");
        assert_eq!(
            w.ledger.goals().get(1, w.goal).unwrap().saved_amount,
            goal_before
        );
    }
    assert!(accepted > 50, "only {accepted} postings accepted");
}

#[test]
fn update_equals_delete_plus_create() {
    let mut rng = SmallRng::seed_from_u64(31337);
    for step in 0..60 {
        let first = world();
        let second = world();
        let original = random_spec(&first, &mut rng);
        let replacement = random_spec(&first, &mut rng);

        let (Ok(a), Ok(b)) = (
            first.ledger.transactions().create(1, &original),
            second.ledger.transactions().create(1, &original),
        ) else {
            continue;
        };
        let updated = first.ledger.transactions().update(1, a.id, &replacement);
        second.ledger.transactions().delete(1, b.id).unwrap();
        let recreated = second.ledger.transactions().create(1, &replacement);

        match (updated, recreated) {
            (Ok(u), Ok(r)) => {
                assert_eq!(u.total_amount, r.total_amount, "step {step}");
                assert_eq!(balances(&first), balances(&second), "step {step}");
            }
            // both paths see the same balances, so both reject
            (Err(_), Err(_)) => {}
            (u, r) => panic!("step {step}: update {u:?} vs recreate {r:?}"),
        }
    }
}

#[test]
fn amount_breakdown_always_adds_up() {
    let mut rng = SmallRng::seed_from_u64(5);
    for _ in 0..2_000 {
        let amount: i64 = rng.random_range(0..10_000_000_000);
        let tax = match rng.random_range(0..4) {
            0 => None,
            1 => Some(Decimal::ZERO),
            _ => Some(Decimal::new(rng.random_range(0..=3_000), 2)),
        };
        let gmf = if rng.random_bool(0.5) {
            Some(Decimal::new(4, 3))
        } else {
            None
        };
        let gross = rng.random_bool(0.5);
        let b = if gross {
            derive_amounts(None, Some(amount), tax, gmf).unwrap()
        } else {
            derive_amounts(Some(amount), None, tax, gmf).unwrap()
        };
        assert_eq!(b.base_amount + b.taxed_amount + b.gmf_amount, b.total_amount);
        assert!(b.base_amount >= 0 && b.taxed_amount >= 0 && b.gmf_amount >= 0);
        if gross && gmf.is_none() {
            assert_eq!(b.total_amount, amount);
        }
        if !gross {
            assert_eq!(b.base_amount, amount);
        }
    }
}

#[test]
fn amortization_rows_sum_to_principal() {
    let mut rng = SmallRng::seed_from_u64(11);
    for _ in 0..500 {
        let principal: i64 = rng.random_range(0..50_000_000);
        let periods: u32 = rng.random_range(1..=48);
        let rate = Decimal::new(rng.random_range(0..500), 2);
        let table = amortize(principal, rate, periods, Rounding::HalfUp).unwrap();
        assert_eq!(table.rows.len(), periods as usize);
        assert_eq!(
            table.rows.iter().map(|r| r.principal_amount).sum::<i64>(),
            principal
        );
        assert_eq!(table.rows.last().unwrap().remaining_principal, 0);
        for row in &table.rows {
            assert!(row.principal_amount >= 0);
            assert!(row.interest_amount >= 0);
            assert_eq!(row.installment_amount, row.principal_amount + row.interest_amount);
        }
        // interest never grows as principal is paid down
        for pair in table.rows.windows(2) {
            assert!(pair[1].interest_amount <= pair[0].interest_amount);
        }
    }
}
