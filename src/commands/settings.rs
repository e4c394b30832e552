// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use clap::ArgMatches;
use rusqlite::Connection;

use crate::commands::{Output, required};
use crate::config::{Config, KEYS};
use crate::utils::pretty_table;

pub fn handle(conn: &Connection, m: &ArgMatches) -> Result<()> {
    let out = Output::from_matches(m);
    match m.subcommand() {
        Some(("show", _)) => {
            let cfg = Config::load(conn)?;
            if !out.json(&cfg)? {
                let rows = KEYS
                    .iter()
                    .map(|k| -> Result<Vec<String>> { Ok(vec![k.to_string(), cfg.value_of(k)?]) })
                    .collect::<Result<Vec<_>>>()?;
                println!("{}", pretty_table(&["Key", "Value"], rows));
            }
        }
        Some(("set", sub)) => {
            let key = required(sub, "key")?;
            let cfg = Config::set(conn, key, required(sub, "value")?)?;
            println!("{} = {}", key, cfg.value_of(key)?);
        }
        _ => {}
    }
    Ok(())
}
