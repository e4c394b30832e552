// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use clap::ArgMatches;

use crate::commands::{Output, required, required_id};
use crate::models::{Account, AccountCategory, AccountType};
use crate::services::{AccountUpdate, Ledger, NewAccount};
use crate::utils::pretty_table;

pub fn handle(ledger: &Ledger, m: &ArgMatches) -> Result<()> {
    let out = Output::from_matches(m);
    match m.subcommand() {
        Some(("add", sub)) => add(ledger, &out, sub)?,
        Some(("list", sub)) => {
            let accounts = ledger.accounts().list(out.owner_id, sub.get_flag("all"))?;
            print_accounts(&out, &accounts)?;
        }
        Some(("show", sub)) => {
            let acct = ledger.accounts().get(out.owner_id, required_id(sub, "id")?)?;
            print_accounts(&out, std::slice::from_ref(&acct))?;
        }
        Some(("update", sub)) => update(ledger, &out, sub)?,
        Some(("adjust", sub)) => {
            let id = required_id(sub, "id")?;
            let balance = out.signed_amount("balance", required(sub, "balance")?)?;
            let reason = sub.get_one::<String>("reason").map(|s| s.as_str());
            let acct = ledger
                .accounts()
                .adjust_balance(out.owner_id, id, balance, reason)?;
            println!(
                "Balance of '{}' set to {}",
                acct.name,
                out.money(acct.current_balance)
            );
        }
        Some(("history", sub)) => {
            let rows = ledger
                .accounts()
                .adjustments(out.owner_id, required_id(sub, "id")?)?;
            if !out.json(&rows)? {
                let data = rows
                    .iter()
                    .map(|a| {
                        vec![
                            a.created_at.clone(),
                            out.money(a.previous_balance),
                            out.money(a.new_balance),
                            a.reason.clone().unwrap_or_default(),
                        ]
                    })
                    .collect();
                println!(
                    "{}",
                    pretty_table(&["When", "Previous", "New", "Reason"], data)
                );
            }
        }
        Some(("deactivate", sub)) => {
            let acct = ledger
                .accounts()
                .deactivate(out.owner_id, required_id(sub, "id")?)?;
            println!("Deactivated account '{}'", acct.name);
        }
        Some(("rm", sub)) => {
            let id = required_id(sub, "id")?;
            ledger.accounts().delete(out.owner_id, id)?;
            println!("Removed account {}", id);
        }
        _ => {}
    }
    Ok(())
}

fn add(ledger: &Ledger, out: &Output, sub: &ArgMatches) -> Result<()> {
    let name = required(sub, "name")?;
    let account_type = AccountType::parse(required(sub, "type")?)?;
    let category = AccountCategory::parse(required(sub, "category")?)?;
    let currency = required(sub, "currency")?;

    let mut new = NewAccount::new(name.as_str(), account_type, category, currency.as_str())
        .gmf_exempt(sub.get_flag("gmf-exempt"));
    if let Some(raw) = sub.get_one::<String>("opening") {
        new = new.opening_balance(out.signed_amount("opening_balance", raw)?);
    }
    if let Some(limit) = out.opt_amount(sub, "limit")? {
        new = new.credit_limit(limit);
    }
    new.account_number = sub.get_one::<String>("number").cloned();
    if let Some(desc) = sub.get_one::<String>("description") {
        new.description = desc.clone();
    }

    let acct = ledger.accounts().create(out.owner_id, &new)?;
    println!(
        "Added account '{}' #{} ({}, {}, {})",
        acct.name, acct.id, acct.account_type, acct.category, acct.currency
    );
    Ok(())
}

fn update(ledger: &Ledger, out: &Output, sub: &ArgMatches) -> Result<()> {
    let id = required_id(sub, "id")?;
    let upd = AccountUpdate {
        name: sub.get_one::<String>("name").cloned(),
        description: sub.get_one::<String>("description").cloned(),
        account_number: sub.get_one::<String>("number").map(|s| Some(s.clone())),
        credit_limit: out.opt_amount(sub, "limit")?.map(Some),
        gmf_exempt: sub.get_one::<bool>("gmf-exempt").copied(),
        is_active: sub.get_one::<bool>("active").copied(),
    };
    let acct = ledger.accounts().update(out.owner_id, id, &upd)?;
    println!("Updated account '{}'", acct.name);
    Ok(())
}

fn print_accounts(out: &Output, accounts: &[Account]) -> Result<()> {
    if out.json(&accounts)? {
        return Ok(());
    }
    let rows = accounts
        .iter()
        .map(|a| {
            vec![
                a.id.to_string(),
                a.name.clone(),
                a.account_type.to_string(),
                a.category.to_string(),
                a.currency.clone(),
                out.money(a.current_balance),
                a.credit_limit.map(|l| out.money(l)).unwrap_or_default(),
                if a.gmf_exempt { "yes" } else { "no" }.to_string(),
                if a.is_active { "active" } else { "inactive" }.to_string(),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(
            &["ID", "Name", "Type", "Category", "CCY", "Balance", "Limit", "GMF exempt", "Status"],
            rows,
        )
    );
    Ok(())
}
