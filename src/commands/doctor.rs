// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::commands::Output;
use crate::config::Config;
use crate::utils::pretty_table;
use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub check: &'static str,
    pub detail: String,
}

// (check name, query returning one detail string per offending row)
const CHECKS: &[(&str, &str)] = &[
    (
        "asset_negative",
        "SELECT 'account ' || id || ' balance ' || current_balance
         FROM accounts WHERE type='asset' AND current_balance < 0",
    ),
    (
        "liability_positive",
        "SELECT 'account ' || id || ' balance ' || current_balance
         FROM accounts WHERE type='liability' AND current_balance > 0",
    ),
    (
        "over_credit_limit",
        "SELECT 'account ' || id || ' debt ' || (-current_balance) || ' limit ' || credit_limit
         FROM accounts WHERE category='credit_card' AND credit_limit IS NOT NULL
           AND -current_balance > credit_limit",
    ),
    (
        "amount_decomposition",
        "SELECT 'transaction ' || id || ' total ' || total_amount
         FROM transactions WHERE base_amount + taxed_amount + gmf_amount != total_amount",
    ),
    (
        "capital_split",
        "SELECT 'transaction ' || id || ' capital ' || capital_amount || ' interest ' || IFNULL(interest_amount, 0)
         FROM transactions WHERE capital_amount IS NOT NULL
           AND capital_amount + IFNULL(interest_amount, 0) != base_amount",
    ),
    (
        "plan_principal",
        "SELECT 'plan ' || pl.id || ' rows ' || IFNULL(SUM(p.principal_amount), 0) || ' purchase ' || pl.purchase_amount
         FROM installment_plans pl LEFT JOIN installment_payments p ON p.plan_id = pl.id
         GROUP BY pl.id HAVING IFNULL(SUM(p.principal_amount), 0) != pl.purchase_amount",
    ),
    (
        "plan_totals",
        "SELECT 'plan ' || pl.id
         FROM installment_plans pl JOIN installment_payments p ON p.plan_id = pl.id
         GROUP BY pl.id
         HAVING SUM(p.installment_amount) != pl.total_amount
             OR SUM(p.interest_amount) != pl.total_interest",
    ),
    (
        "plan_status",
        "SELECT 'plan ' || pl.id || ' is ' || pl.status || ' with ' ||
                SUM(p.status != 'completed') || ' open rows'
         FROM installment_plans pl JOIN installment_payments p ON p.plan_id = pl.id
         GROUP BY pl.id
         HAVING (pl.status = 'active' AND SUM(p.status != 'completed') = 0)
             OR (pl.status = 'completed' AND SUM(p.status != 'completed') > 0)",
    ),
    (
        "goal_saved",
        "SELECT 'goal ' || g.id || ' saved ' || g.saved_amount || ' postings ' || IFNULL(SUM(t.total_amount), 0)
         FROM goals g LEFT JOIN transactions t ON t.goal_id = g.id AND t.kind = 4
         GROUP BY g.id HAVING IFNULL(SUM(t.total_amount), 0) != g.saved_amount",
    ),
];

pub fn run(conn: &Connection, config: &Config) -> Result<Vec<Finding>> {
    let mut findings = Vec::new();
    for &(check, sql) in CHECKS {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
        for detail in rows {
            findings.push(Finding {
                check,
                detail: detail?,
            });
        }
    }

    let mut stmt = conn.prepare("SELECT DISTINCT currency FROM accounts ORDER BY currency")?;
    let currencies = stmt.query_map([], |r| r.get::<_, String>(0))?;
    for ccy in currencies {
        let ccy = ccy?;
        if !config.is_supported(&ccy) {
            findings.push(Finding {
                check: "unsupported_currency",
                detail: ccy,
            });
        }
    }
    Ok(findings)
}

pub fn handle(conn: &Connection, config: &Config, m: &clap::ArgMatches) -> Result<()> {
    let out = Output::from_matches(m);
    let findings = run(conn, config)?;
    if out.json(&findings)? {
        return Ok(());
    }
    if findings.is_empty() {
        println!("doctor: no issues found");
    } else {
        let rows = findings
            .iter()
            .map(|f| vec![f.check.to_string(), f.detail.clone()])
            .collect();
        println!("{}", pretty_table(&["Issue", "Detail"], rows));
    }
    Ok(())
}
