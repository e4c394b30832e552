// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::NaiveDate;
use ledgerline::commands::fx::import_rates;
use ledgerline::{FinanceError, Ledger};
use rust_decimal::Decimal;

fn setup() -> Ledger {
    let ledger = Ledger::in_memory().unwrap();
    // 1 USD = 4000 COP for January only
    ledger
        .fx()
        .upsert_rate("COP", "USD", 2025, 1, Decimal::from(4000), None)
        .unwrap();
    ledger
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn stale_rate_converts_with_warning() {
    let ledger = setup();
    let res = ledger
        .fx()
        .convert(400_000_000, "COP", "USD", date(2025, 2, 15))
        .unwrap();
    assert_eq!(res.amount, 100_000);
    let warning = res.warning.unwrap();
    assert!(warning.contains("2025-02"), "{warning}");
    assert!(warning.contains("2025-01"), "{warning}");
}

#[test]
fn same_month_rate_has_no_warning() {
    let ledger = setup();
    let quote = ledger.fx().rate("cop", "usd", date(2025, 1, 31)).unwrap();
    assert_eq!(quote.rate, Decimal::from(4000));
    assert!(!quote.inverted);
    assert!(!quote.is_stale());
    assert_eq!(quote.row.unwrap().period(), "2025-01");
}

#[test]
fn inverse_pair_is_used_when_direct_is_missing() {
    let ledger = setup();
    let res = ledger
        .fx()
        .convert(100_000, "USD", "COP", date(2025, 1, 10))
        .unwrap();
    assert_eq!(res.amount, 400_000_000);
    assert_eq!(res.rate, Decimal::new(25, 5));
    assert!(res.warning.is_none());

    let quote = ledger.fx().rate("USD", "COP", date(2025, 1, 10)).unwrap();
    assert!(quote.inverted);
}

#[test]
fn current_inverse_row_beats_stale_direct_row() {
    let ledger = setup();
    ledger
        .fx()
        .upsert_rate("USD", "COP", 2025, 3, Decimal::new(2, 4), None)
        .unwrap();
    let quote = ledger.fx().rate("COP", "USD", date(2025, 3, 10)).unwrap();
    assert!(quote.inverted);
    assert!(quote.warning.is_none());
    let res = ledger
        .fx()
        .convert(500_000, "COP", "USD", date(2025, 3, 10))
        .unwrap();
    assert_eq!(res.amount, 100);

    // before the inverse row exists the direct January row still applies
    let quote = ledger.fx().rate("COP", "USD", date(2025, 2, 10)).unwrap();
    assert!(!quote.inverted);
    assert!(quote.warning.unwrap().contains("2025-01"));

    // same month on both sides: the direct row is used
    ledger
        .fx()
        .upsert_rate("USD", "COP", 2025, 1, Decimal::new(25, 5), None)
        .unwrap();
    let quote = ledger.fx().rate("COP", "USD", date(2025, 1, 10)).unwrap();
    assert!(!quote.inverted);
    assert_eq!(quote.rate, Decimal::from(4000));
}

#[test]
fn newer_row_wins_over_older() {
    let ledger = setup();
    ledger
        .fx()
        .upsert_rate("COP", "USD", 2025, 3, Decimal::from(5000), Some("bank"))
        .unwrap();
    let res = ledger
        .fx()
        .convert(500_000, "COP", "USD", date(2025, 4, 2))
        .unwrap();
    assert_eq!(res.amount, 100);
    assert!(res.warning.unwrap().contains("2025-03"));

    // February still falls back to January
    let res = ledger
        .fx()
        .convert(400_000, "COP", "USD", date(2025, 2, 1))
        .unwrap();
    assert_eq!(res.amount, 100);
}

#[test]
fn no_rate_before_first_row() {
    let ledger = setup();
    match ledger.fx().convert(1_000, "COP", "USD", date(2024, 12, 31)) {
        Err(FinanceError::NoRateAvailable { pair, on_date }) => {
            assert_eq!(pair, "COP/USD");
            assert_eq!(on_date, date(2024, 12, 31));
        }
        other => panic!("expected NoRateAvailable, got {other:?}"),
    }
    assert!(matches!(
        ledger.fx().rate("EUR", "USD", date(2025, 1, 1)),
        Err(FinanceError::NoRateAvailable { .. })
    ));
}

#[test]
fn identity_conversion() {
    let ledger = setup();
    let res = ledger.fx().convert(1_234, "EUR", "EUR", date(2025, 1, 1)).unwrap();
    assert_eq!(res.amount, 1_234);
    assert_eq!(res.rate, Decimal::ONE);
}

#[test]
fn upsert_replaces_month_and_validates() {
    let ledger = setup();
    let fx = ledger.fx();
    let row = fx
        .upsert_rate("COP", "USD", 2025, 1, Decimal::from(4100), Some("bank"))
        .unwrap();
    assert_eq!(row.rate, Decimal::from(4100));
    assert_eq!(row.source, "bank");
    assert_eq!(fx.list_rates(Some("COP"), None).unwrap().len(), 1);

    assert!(matches!(
        fx.upsert_rate("COP", "JPY", 2025, 1, Decimal::ONE, None),
        Err(FinanceError::Validation { .. })
    ));
    assert!(matches!(
        fx.upsert_rate("COP", "COP", 2025, 1, Decimal::ONE, None),
        Err(FinanceError::Validation { .. })
    ));
    assert!(matches!(
        fx.upsert_rate("COP", "USD", 2025, 13, Decimal::ONE, None),
        Err(FinanceError::Validation { .. })
    ));
    assert!(matches!(
        fx.upsert_rate("COP", "USD", 2025, 2, Decimal::ZERO, None),
        Err(FinanceError::Validation { .. })
    ));

    fx.delete_rate(row.id).unwrap();
    assert!(matches!(
        fx.get_rate_row(row.id),
        Err(FinanceError::NotFound { .. })
    ));
    assert!(matches!(fx.delete_rate(row.id), Err(FinanceError::NotFound { .. })));
}

#[test]
fn base_currency_defaults_then_persists() {
    let ledger = setup();
    let fx = ledger.fx();
    assert_eq!(fx.base_currency(7).unwrap(), "COP");
    assert_eq!(fx.set_base_currency(7, "usd").unwrap(), "USD");
    assert_eq!(fx.base_currency(7).unwrap(), "USD");
    assert_eq!(fx.base_currency(8).unwrap(), "COP");
    assert!(fx.set_base_currency(7, "XYZ").is_err());
}

#[test]
fn csv_import_upserts_rows() {
    let ledger = setup();
    let data = "base,quote,month,rate,source\n\
                COP,USD,2025-02,4100,banrep\n\
                EUR,USD,2025-02,0.92,\n";
    let n = import_rates(&ledger.fx(), data.as_bytes()).unwrap();
    assert_eq!(n, 2);

    let res = ledger
        .fx()
        .convert(410_000, "COP", "USD", date(2025, 2, 15))
        .unwrap();
    assert_eq!(res.amount, 100);
    assert!(res.warning.is_none());

    let eur = ledger.fx().list_rates(Some("EUR"), Some("USD")).unwrap();
    assert_eq!(eur.len(), 1);
    assert_eq!(eur[0].source, "csv");
}

#[test]
fn csv_import_stops_at_bad_row() {
    let ledger = setup();
    let data = "base,quote,month,rate\nCOP,USD,2025-03,4200\nCOP,USD,March,4300\n";
    assert!(import_rates(&ledger.fx(), data.as_bytes()).is_err());
}
