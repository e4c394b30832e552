// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use clap::ArgMatches;

use crate::commands::{Output, required, required_id};
use crate::models::{Transaction, TransactionKind};
use crate::services::{Ledger, TransactionFilter, TransactionOrder, TransactionSpec};
use crate::utils::{parse_date, parse_decimal, pretty_table};

pub fn handle(ledger: &Ledger, m: &ArgMatches) -> Result<()> {
    let out = Output::from_matches(m);
    match m.subcommand() {
        Some(("add", sub)) => {
            let spec = spec_from_args(&out, sub)?;
            let tx = ledger.transactions().create(out.owner_id, &spec)?;
            println!(
                "Recorded {} #{}: base {} + tax {} + GMF {} = {}",
                tx.kind,
                tx.id,
                out.money(tx.base_amount),
                out.money(tx.taxed_amount),
                out.money(tx.gmf_amount),
                out.money(tx.total_amount)
            );
        }
        Some(("update", sub)) => {
            let id = required_id(sub, "id")?;
            let spec = spec_from_args(&out, sub)?;
            let tx = ledger.transactions().update(out.owner_id, id, &spec)?;
            println!("Updated transaction #{} (total {})", tx.id, out.money(tx.total_amount));
        }
        Some(("show", sub)) => {
            let tx = ledger
                .transactions()
                .get(out.owner_id, required_id(sub, "id")?)?;
            print_transactions(&out, std::slice::from_ref(&tx))?;
        }
        Some(("rm", sub)) => {
            let id = required_id(sub, "id")?;
            ledger.transactions().delete(out.owner_id, id)?;
            println!("Deleted transaction #{}", id);
        }
        Some(("list", sub)) => {
            let filter = filter_from_args(&out, sub)?;
            let rows = ledger.transactions().list(out.owner_id, &filter)?;
            print_transactions(&out, &rows)?;
        }
        _ => {}
    }
    Ok(())
}

pub fn spec_from_args(out: &Output, sub: &ArgMatches) -> Result<TransactionSpec> {
    let kind = TransactionKind::parse(required(sub, "kind")?)?;
    let origin = required_id(sub, "from")?;
    let date = parse_date(required(sub, "date")?)?;

    let mut spec = TransactionSpec::new(kind, origin, date);
    spec.destination_account_id = sub.get_one::<i64>("to").copied();
    spec.category_id = sub.get_one::<i64>("category").copied();
    spec.goal_id = sub.get_one::<i64>("goal").copied();
    spec.base_amount = out.opt_amount(sub, "base")?;
    spec.total_amount = out.opt_amount(sub, "total")?;
    spec.capital_amount = out.opt_amount(sub, "capital")?;
    spec.tax_percentage = sub
        .get_one::<String>("tax")
        .map(|s| parse_decimal(s))
        .transpose()?;
    if let Some(ccy) = sub.get_one::<String>("currency") {
        spec.transaction_currency = Some(ccy.clone());
        spec.exchange_rate = sub
            .get_one::<String>("rate")
            .map(|s| parse_decimal(s))
            .transpose()?;
        spec.original_amount = out.opt_amount(sub, "original")?;
    }
    spec.description = sub.get_one::<String>("description").cloned();
    spec.tag = sub.get_one::<String>("tag").cloned();
    spec.note = sub.get_one::<String>("note").cloned();
    spec.applied_rule_id = sub.get_one::<i64>("rule").copied();
    Ok(spec)
}

pub fn filter_from_args(out: &Output, sub: &ArgMatches) -> Result<TransactionFilter> {
    Ok(TransactionFilter {
        kind: sub
            .get_one::<String>("kind")
            .map(|k| TransactionKind::parse(k))
            .transpose()?,
        origin_account_id: sub.get_one::<i64>("account").copied(),
        destination_account_id: sub.get_one::<i64>("destination").copied(),
        category_id: sub.get_one::<i64>("category").copied(),
        from: sub
            .get_one::<String>("from")
            .map(|s| parse_date(s))
            .transpose()?,
        to: sub
            .get_one::<String>("to")
            .map(|s| parse_date(s))
            .transpose()?,
        min_total: out.opt_amount(sub, "min")?,
        max_total: out.opt_amount(sub, "max")?,
        text: sub.get_one::<String>("text").cloned(),
        order_by: sub
            .get_one::<String>("order")
            .map(|o| TransactionOrder::parse(o))
            .transpose()?
            .unwrap_or_default(),
        limit: sub.get_one::<usize>("limit").copied(),
    })
}

fn print_transactions(out: &Output, rows: &[Transaction]) -> Result<()> {
    if out.json(&rows)? {
        return Ok(());
    }
    let data = rows
        .iter()
        .map(|t| {
            vec![
                t.id.to_string(),
                t.date.to_string(),
                t.kind.to_string(),
                t.origin_account_id.to_string(),
                t.destination_account_id.map(|d| d.to_string()).unwrap_or_default(),
                out.money(t.base_amount),
                out.money(t.taxed_amount),
                out.money(t.gmf_amount),
                out.money(t.total_amount),
                t.transaction_currency.clone(),
                t.description.clone().unwrap_or_default(),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(
            &["ID", "Date", "Kind", "From", "To", "Base", "Tax", "GMF", "Total", "CCY", "Description"],
            data,
        )
    );
    Ok(())
}
