// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use clap::ArgMatches;

use crate::commands::{Output, required, required_id};
use crate::models::CategoryKind;
use crate::services::Ledger;
use crate::utils::pretty_table;

pub fn handle(ledger: &Ledger, m: &ArgMatches) -> Result<()> {
    let out = Output::from_matches(m);
    match m.subcommand() {
        Some(("add", sub)) => {
            let name = required(sub, "name")?;
            let kind = CategoryKind::parse(required(sub, "kind")?)?;
            let cat = ledger.categories().create(out.owner_id, name, kind)?;
            println!("Added {} category '{}' #{}", cat.kind, cat.name, cat.id);
        }
        Some(("list", sub)) => {
            let kind = sub
                .get_one::<String>("kind")
                .map(|k| CategoryKind::parse(k))
                .transpose()?;
            let cats = ledger.categories().list(out.owner_id, kind)?;
            if !out.json(&cats)? {
                let rows = cats
                    .iter()
                    .map(|c| vec![c.id.to_string(), c.name.clone(), c.kind.to_string()])
                    .collect();
                println!("{}", pretty_table(&["ID", "Name", "Kind"], rows));
            }
        }
        Some(("rm", sub)) => {
            let id = required_id(sub, "id")?;
            ledger.categories().delete(out.owner_id, id)?;
            println!("Removed category {}", id);
        }
        _ => {}
    }
    Ok(())
}
