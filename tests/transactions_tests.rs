// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::io::Write;

use chrono::NaiveDate;
use ledgerline::commands::{self, Output, transactions};
use ledgerline::models::{PaymentStatus, TransactionKind};
use ledgerline::services::TransactionOrder;
use ledgerline::{FinanceError, Ledger, cli};
use rust_decimal::Decimal;

/// Parse `args` with the real command tree and dispatch like the binary does.
fn run(ledger: &Ledger, args: &[&str]) -> anyhow::Result<()> {
    let mut argv = vec!["ledgerline"];
    argv.extend_from_slice(args);
    let matches = cli::build_cli().get_matches_from(argv);
    match matches.subcommand() {
        Some(("account", sub)) => commands::accounts::handle(ledger, sub),
        Some(("category", sub)) => commands::categories::handle(ledger, sub),
        Some(("tx", sub)) => commands::transactions::handle(ledger, sub),
        Some(("goal", sub)) => commands::goals::handle(ledger, sub),
        Some(("plan", sub)) => commands::plans::handle(ledger, sub),
        Some(("fx", sub)) => commands::fx::handle(ledger, sub),
        other => panic!("unexpected command {other:?}"),
    }
}

/// Bank #1 with 10_000.00, Visa #2 with a 50_000.00 limit, Food #1, Interest #2.
fn setup() -> Ledger {
    let ledger = Ledger::in_memory().unwrap();
    run(
        &ledger,
        &["account", "add", "Bank", "--type", "asset", "--category", "bank", "--currency", "COP", "--opening", "10000"],
    )
    .unwrap();
    run(
        &ledger,
        &["account", "add", "Visa", "--type", "liability", "--category", "credit-card", "--currency", "cop", "--limit", "50000"],
    )
    .unwrap();
    run(&ledger, &["category", "add", "Food", "--kind", "expense"]).unwrap();
    run(&ledger, &["category", "add", "Interest", "--kind", "expense"]).unwrap();
    ledger
}

#[test]
fn add_reads_major_units_by_default() {
    let ledger = setup();
    assert_eq!(ledger.accounts().get(1, 1).unwrap().current_balance, 1_000_000);
    run(
        &ledger,
        &["tx", "add", "--kind", "expense", "--from", "1", "--category", "1", "--date", "2025-03-01", "--base", "1000", "--description", "groceries"],
    )
    .unwrap();
    let tx = ledger.transactions().get(1, 1).unwrap();
    assert_eq!(tx.base_amount, 100_000);
    assert_eq!(tx.gmf_amount, 400);
    assert_eq!(tx.total_amount, 100_400);
    assert_eq!(ledger.accounts().get(1, 1).unwrap().current_balance, 899_600);
}

#[test]
fn minor_flag_switches_amount_units() {
    let ledger = setup();
    run(
        &ledger,
        &["--minor", "tx", "add", "--kind", "expense", "--from", "2", "--category", "1", "--date", "2025-03-01", "--base", "2500"],
    )
    .unwrap();
    let tx = ledger.transactions().get(1, 1).unwrap();
    assert_eq!(tx.base_amount, 2_500);
    assert_eq!(tx.gmf_amount, 0);
    assert_eq!(ledger.accounts().get(1, 2).unwrap().current_balance, -2_500);

    // three decimals are not a valid major amount
    assert!(run(
        &ledger,
        &["tx", "add", "--kind", "expense", "--from", "1", "--category", "1", "--date", "2025-03-01", "--base", "1.005"],
    )
    .is_err());
}

#[test]
fn spec_from_args_builds_foreign_currency_spec() {
    let matches = cli::build_cli().get_matches_from([
        "ledgerline", "tx", "add", "--kind", "income", "--from", "1", "--category", "3", "--date", "2025-04-02",
        "--total", "119", "--tax", "19", "--currency", "USD", "--rate", "4000", "--original", "0.03",
        "--tag", "side", "--rule", "9",
    ]);
    let Some(("tx", tx_m)) = matches.subcommand() else {
        panic!("no tx subcommand");
    };
    let Some(("add", add_m)) = tx_m.subcommand() else {
        panic!("no add subcommand");
    };
    let spec = transactions::spec_from_args(&Output::from_matches(tx_m), add_m).unwrap();
    assert_eq!(spec.kind, TransactionKind::Income);
    assert_eq!(spec.date, NaiveDate::from_ymd_opt(2025, 4, 2).unwrap());
    assert_eq!(spec.total_amount, Some(11_900));
    assert_eq!(spec.base_amount, None);
    assert_eq!(spec.tax_percentage, Some(Decimal::from(19)));
    assert_eq!(spec.transaction_currency.as_deref(), Some("USD"));
    assert_eq!(spec.original_amount, Some(3));
    assert_eq!(spec.tag.as_deref(), Some("side"));
    assert_eq!(spec.applied_rule_id, Some(9));
}

#[test]
fn clap_rejects_conflicting_amounts() {
    let base_and_total = cli::build_cli().try_get_matches_from([
        "ledgerline", "tx", "add", "--kind", "expense", "--from", "1", "--date", "2025-01-01", "--base", "1", "--total", "2",
    ]);
    assert!(base_and_total.is_err());

    let currency_without_rate = cli::build_cli().try_get_matches_from([
        "ledgerline", "tx", "add", "--kind", "expense", "--from", "1", "--date", "2025-01-01", "--base", "1", "--currency", "USD",
    ]);
    assert!(currency_without_rate.is_err());
}

#[test]
fn list_limit_and_order_respected() {
    let ledger = setup();
    for (day, base) in [("01", "10"), ("02", "30"), ("03", "20")] {
        let date = format!("2025-01-{day}");
        run(
            &ledger,
            &["tx", "add", "--kind", "expense", "--from", "1", "--category", "1", "--date", date.as_str(), "--base", base],
        )
        .unwrap();
    }

    let matches = cli::build_cli().get_matches_from(["ledgerline", "tx", "list", "--limit", "2", "--order", "total-desc"]);
    if let Some(("tx", tx_m)) = matches.subcommand() {
        if let Some(("list", list_m)) = tx_m.subcommand() {
            let filter = transactions::filter_from_args(&Output::from_matches(tx_m), list_m).unwrap();
            assert_eq!(filter.order_by, TransactionOrder::TotalDesc);
            let rows = ledger.transactions().list(1, &filter).unwrap();
            assert_eq!(rows.len(), 2);
            assert_eq!(rows[0].base_amount, 3_000);
            assert_eq!(rows[1].base_amount, 2_000);
        } else {
            panic!("no list subcommand");
        }
    } else {
        panic!("no tx subcommand");
    }
}

#[test]
fn engine_errors_surface_through_anyhow() {
    let ledger = setup();
    let err = run(
        &ledger,
        &["tx", "add", "--kind", "expense", "--from", "2", "--category", "1", "--date", "2025-03-01", "--base", "60000"],
    )
    .unwrap_err();
    match err.downcast_ref::<FinanceError>() {
        Some(FinanceError::CreditLimitExceeded { limit, .. }) => assert_eq!(*limit, 5_000_000),
        other => panic!("expected credit limit error, got {other:?}"),
    }

    let err = run(&ledger, &["--user", "2", "tx", "show", "1"]).unwrap_err();
    assert!(err.downcast_ref::<FinanceError>().is_some());
}

#[test]
fn update_and_rm_via_cli() {
    let ledger = setup();
    run(
        &ledger,
        &["tx", "add", "--kind", "expense", "--from", "1", "--category", "1", "--date", "2025-03-01", "--base", "100"],
    )
    .unwrap();
    run(
        &ledger,
        &["tx", "update", "1", "--kind", "expense", "--from", "1", "--category", "1", "--date", "2025-03-02", "--base", "50"],
    )
    .unwrap();
    let tx = ledger.transactions().get(1, 1).unwrap();
    assert_eq!(tx.total_amount, 5_020);
    assert_eq!(ledger.accounts().get(1, 1).unwrap().current_balance, 1_000_000 - 5_020);

    run(&ledger, &["tx", "rm", "1"]).unwrap();
    assert_eq!(ledger.accounts().get(1, 1).unwrap().current_balance, 1_000_000);
}

#[test]
fn installment_plan_via_cli() {
    let ledger = setup();
    run(
        &ledger,
        &["tx", "add", "--kind", "expense", "--from", "2", "--category", "1", "--date", "2024-12-15", "--base", "12000", "--description", "Phone"],
    )
    .unwrap();
    run(
        &ledger,
        &["plan", "create", "--purchase", "1", "--installments", "12", "--rate", "2", "--start", "2025-01-01", "--financing-category", "2"],
    )
    .unwrap();
    run(&ledger, &["plan", "pay", "1", "1", "--date", "2025-02-01", "--from", "1", "--notes", "on time"]).unwrap();

    let rows = ledger.plans().payments(1, 1).unwrap();
    assert_eq!(rows[0].status, PaymentStatus::Completed);
    assert_eq!(rows[0].notes.as_deref(), Some("on time"));
    assert_eq!(ledger.accounts().get(1, 1).unwrap().current_balance, 1_000_000 - 113_472);
    assert_eq!(ledger.accounts().get(1, 2).unwrap().current_balance, -1_200_000 + 89_472);

    run(&ledger, &["plan", "update", "1", "--installments", "6"]).unwrap();
    assert_eq!(ledger.plans().payments(1, 1).unwrap().len(), 6);
    run(&ledger, &["plan", "preview", "--amount", "12000", "--installments", "12", "--rate", "2", "--start", "2025-01-01"]).unwrap();
    run(&ledger, &["plan", "cancel", "1"]).unwrap();
    assert!(run(&ledger, &["plan", "pay", "1", "2", "--date", "2025-03-01", "--from", "1"]).is_err());
}

#[test]
fn fx_import_from_file() {
    let ledger = Ledger::in_memory().unwrap();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "base,quote,month,rate").unwrap();
    writeln!(file, "COP,USD,2025-01,4000").unwrap();
    file.flush().unwrap();

    run(&ledger, &["fx", "import", file.path().to_str().unwrap()]).unwrap();
    run(&ledger, &["fx", "add", "EUR", "USD", "2025-01", "0.9", "--source", "ecb"]).unwrap();
    run(&ledger, &["--user", "3", "fx", "set-base", "usd"]).unwrap();

    let res = ledger
        .fx()
        .convert(400_000_000, "COP", "USD", NaiveDate::from_ymd_opt(2025, 2, 15).unwrap())
        .unwrap();
    assert_eq!(res.amount, 100_000);
    assert!(res.warning.unwrap().contains("2025-02"));
    assert_eq!(ledger.fx().list_rates(None, None).unwrap().len(), 2);
    assert_eq!(ledger.fx().base_currency(3).unwrap(), "USD");
}
