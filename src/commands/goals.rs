// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use clap::ArgMatches;

use crate::commands::{Output, required, required_id};
use crate::models::Goal;
use crate::services::{GoalUpdate, Ledger};
use crate::utils::pretty_table;

pub fn handle(ledger: &Ledger, m: &ArgMatches) -> Result<()> {
    let out = Output::from_matches(m);
    match m.subcommand() {
        Some(("add", sub)) => {
            let name = required(sub, "name")?;
            let currency = required(sub, "currency")?;
            let target = out.amount("target_amount", required(sub, "target")?)?;
            let goal = ledger
                .goals()
                .create(out.owner_id, name, currency, target)?;
            println!("Added goal '{}' #{}", goal.name, goal.id);
        }
        Some(("list", _)) => {
            let goals = ledger.goals().list(out.owner_id)?;
            print_goals(&out, &goals)?;
        }
        Some(("show", sub)) => {
            let goal = ledger.goals().get(out.owner_id, required_id(sub, "id")?)?;
            print_goals(&out, std::slice::from_ref(&goal))?;
        }
        Some(("update", sub)) => {
            let upd = GoalUpdate {
                name: sub.get_one::<String>("name").cloned(),
                target_amount: out.opt_amount(sub, "target")?,
            };
            let goal = ledger
                .goals()
                .update(out.owner_id, required_id(sub, "id")?, &upd)?;
            println!("Updated goal '{}'", goal.name);
        }
        Some(("rm", sub)) => {
            let id = required_id(sub, "id")?;
            ledger.goals().delete(out.owner_id, id)?;
            println!("Removed goal {}", id);
        }
        _ => {}
    }
    Ok(())
}

fn print_goals(out: &Output, goals: &[Goal]) -> Result<()> {
    if out.json(&goals)? {
        return Ok(());
    }
    let rows = goals
        .iter()
        .map(|g| {
            vec![
                g.id.to_string(),
                g.name.clone(),
                g.currency.clone(),
                out.money(g.target_amount),
                out.money(g.saved_amount),
                out.money(g.remaining()),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(&["ID", "Name", "CCY", "Target", "Saved", "Remaining"], rows)
    );
    Ok(())
}
