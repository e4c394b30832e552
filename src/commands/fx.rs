// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::ArgMatches;
use serde::Deserialize;
use std::io::Read;

use crate::commands::{Output, required, required_id};
use crate::services::Ledger;
use crate::services::fx::Fx;
use crate::utils::{parse_date, parse_decimal, parse_month, pretty_table};

pub fn handle(ledger: &Ledger, m: &ArgMatches) -> Result<()> {
    let out = Output::from_matches(m);
    let fx = ledger.fx();
    match m.subcommand() {
        Some(("set-base", sub)) => {
            let ccy = fx.set_base_currency(out.owner_id, required(sub, "currency")?)?;
            println!("Base currency set to {}", ccy);
        }
        Some(("base", _)) => {
            println!("{}", fx.base_currency(out.owner_id)?);
        }
        Some(("add", sub)) => {
            let (year, month) = parse_month(required(sub, "month")?)?;
            let row = fx.upsert_rate(
                required(sub, "base")?,
                required(sub, "quote")?,
                year,
                month,
                parse_decimal(required(sub, "rate")?)?,
                sub.get_one::<String>("source").map(|s| s.as_str()),
            )?;
            println!(
                "Stored {}/{} {} = {} (#{})",
                row.base,
                row.quote,
                row.period(),
                row.rate,
                row.id
            );
        }
        Some(("list", sub)) => {
            let rows = fx.list_rates(
                sub.get_one::<String>("base").map(|s| s.as_str()),
                sub.get_one::<String>("quote").map(|s| s.as_str()),
            )?;
            if !out.json(&rows)? {
                let data = rows
                    .iter()
                    .map(|r| {
                        vec![
                            r.id.to_string(),
                            r.base.clone(),
                            r.quote.clone(),
                            r.period(),
                            r.rate.to_string(),
                            r.source.clone(),
                        ]
                    })
                    .collect();
                println!(
                    "{}",
                    pretty_table(&["ID", "Base", "Quote", "Month", "Rate", "Source"], data)
                );
            }
        }
        Some(("rm", sub)) => {
            let id = required_id(sub, "id")?;
            fx.delete_rate(id)?;
            println!("Removed rate #{}", id);
        }
        Some(("rate", sub)) => {
            let quote = fx.rate(
                required(sub, "from")?,
                required(sub, "to")?,
                on_date(sub)?,
            )?;
            if !out.json(&quote)? {
                println!("1 {} = {} {}", quote.to, quote.rate, quote.from);
                if let Some(w) = &quote.warning {
                    eprintln!("warning: {}", w);
                }
            }
        }
        Some(("convert", sub)) => {
            let amount = out.amount("amount", required(sub, "amount")?)?;
            let from = required(sub, "from")?;
            let to = required(sub, "to")?;
            let conv = fx.convert(amount, from, to, on_date(sub)?)?;
            if !out.json(&conv)? {
                println!(
                    "{} {} = {} {}",
                    out.money(amount),
                    from.to_uppercase(),
                    out.money(conv.amount),
                    to.to_uppercase()
                );
                if let Some(w) = &conv.warning {
                    eprintln!("warning: {}", w);
                }
            }
        }
        Some(("import", sub)) => {
            let path = required(sub, "file")?;
            let file = std::fs::File::open(path).with_context(|| format!("Open {}", path))?;
            let n = import_rates(&fx, file)?;
            println!("Imported {} exchange rates from {}", n, path);
        }
        _ => {}
    }
    Ok(())
}

fn on_date(sub: &ArgMatches) -> Result<NaiveDate> {
    match sub.get_one::<String>("date") {
        Some(s) => parse_date(s),
        None => Ok(Utc::now().date_naive()),
    }
}

#[derive(Debug, Deserialize)]
struct RateRecord {
    base: String,
    quote: String,
    month: String,
    rate: String,
    #[serde(default)]
    source: Option<String>,
}

/// Upsert every `base,quote,month,rate[,source]` record. Stops at the first bad row.
pub fn import_rates<R: Read>(fx: &Fx<'_>, reader: R) -> Result<usize> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let mut count = 0usize;
    for (line, rec) in rdr.deserialize::<RateRecord>().enumerate() {
        let rec = rec.with_context(|| format!("CSV row {}", line + 2))?;
        let (year, month) = parse_month(&rec.month)?;
        let rate = parse_decimal(&rec.rate)?;
        fx.upsert_rate(
            &rec.base,
            &rec.quote,
            year,
            month,
            rate,
            Some(rec.source.as_deref().unwrap_or("csv")),
        )
        .with_context(|| format!("CSV row {}", line + 2))?;
        count += 1;
    }
    tracing::info!(count, "exchange rates imported");
    Ok(count)
}
