// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;

use ledgerline::{Ledger, cli, commands, db, utils};

fn main() -> Result<()> {
    utils::init_tracing();
    let cli = cli::build_cli();
    let matches = cli.get_matches();

    let ledger = Ledger::open(db::open_or_init()?)?;

    match matches.subcommand() {
        Some(("init", _)) => {
            ledger.config().save(ledger.conn())?;
            println!("Database initialized at {}", db::db_path()?.display());
        }
        Some(("account", sub)) => commands::accounts::handle(&ledger, sub)?,
        Some(("category", sub)) => commands::categories::handle(&ledger, sub)?,
        Some(("tx", sub)) => commands::transactions::handle(&ledger, sub)?,
        Some(("goal", sub)) => commands::goals::handle(&ledger, sub)?,
        Some(("plan", sub)) => commands::plans::handle(&ledger, sub)?,
        Some(("fx", sub)) => commands::fx::handle(&ledger, sub)?,
        Some(("settings", sub)) => commands::settings::handle(ledger.conn(), sub)?,
        Some(("doctor", sub)) => commands::doctor::handle(ledger.conn(), ledger.config(), sub)?,
        _ => {
            cli::build_cli().print_help()?;
            println!();
        }
    }
    Ok(())
}
