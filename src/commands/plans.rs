// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use clap::ArgMatches;

use crate::commands::{Output, required, required_count, required_id};
use crate::models::{InstallmentPlan, PlanStatus};
use crate::services::installments::Schedule;
use crate::services::{Ledger, NewPlan, PlanUpdate};
use crate::utils::{parse_date, parse_decimal, pretty_table};

pub fn handle(ledger: &Ledger, m: &ArgMatches) -> Result<()> {
    let out = Output::from_matches(m);
    let plans = ledger.plans();
    match m.subcommand() {
        Some(("create", sub)) => {
            let new = NewPlan {
                purchase_transaction_id: required_id(sub, "purchase")?,
                number_of_installments: required_count(sub, "installments")?,
                interest_rate: parse_decimal(required(sub, "rate")?)?,
                start_date: parse_date(required(sub, "start")?)?,
                financing_category_id: required_id(sub, "financing-category")?,
                description: sub.get_one::<String>("description").cloned(),
            };
            let plan = plans.create_from_purchase(out.owner_id, &new)?;
            println!(
                "Created plan #{}: {} x {} ({} interest)",
                plan.id,
                plan.number_of_installments,
                out.money(plan.installment_amount),
                out.money(plan.total_interest)
            );
        }
        Some(("preview", sub)) => {
            let schedule = plans.preview(
                out.amount("purchase_amount", required(sub, "amount")?)?,
                required_count(sub, "installments")?,
                parse_decimal(required(sub, "rate")?)?,
                parse_date(required(sub, "start")?)?,
            )?;
            print_schedule(&out, &schedule)?;
        }
        Some(("schedule", sub)) => {
            let as_of = opt_date(sub, "as-of")?.unwrap_or_else(today);
            let schedule = plans.schedule(out.owner_id, required_id(sub, "id")?, as_of)?;
            print_schedule(&out, &schedule)?;
        }
        Some(("pay", sub)) => {
            let plan_id = required_id(sub, "id")?;
            let number = required_count(sub, "installment")?;
            let receipt = plans.record_payment(
                out.owner_id,
                plan_id,
                number,
                parse_date(required(sub, "date")?)?,
                required_id(sub, "from")?,
                sub.get_one::<String>("notes").map(|s| s.as_str()),
            )?;
            if !out.json(&receipt)? {
                println!(
                    "Paid installment {} of plan #{}: capital {} (tx #{}), interest {}{}; plan is {}",
                    number,
                    plan_id,
                    out.money(receipt.payment.principal_amount),
                    receipt.capital_transaction.id,
                    out.money(receipt.payment.interest_amount),
                    receipt
                        .interest_transaction
                        .as_ref()
                        .map(|t| format!(" (tx #{})", t.id))
                        .unwrap_or_default(),
                    receipt.plan_status
                );
            }
        }
        Some(("update", sub)) => {
            let upd = PlanUpdate {
                number_of_installments: sub.get_one::<u32>("installments").copied(),
                interest_rate: sub
                    .get_one::<String>("rate")
                    .map(|s| parse_decimal(s))
                    .transpose()?,
                start_date: opt_date(sub, "start")?,
                description: sub.get_one::<String>("description").cloned(),
            };
            let plan = plans.update(out.owner_id, required_id(sub, "id")?, &upd)?;
            println!(
                "Updated plan #{}: {} installments, {} total",
                plan.id,
                plan.number_of_installments,
                out.money(plan.total_amount)
            );
        }
        Some(("cancel", sub)) => {
            let plan = plans.cancel(out.owner_id, required_id(sub, "id")?)?;
            println!("Cancelled plan #{}", plan.id);
        }
        Some(("overdue", sub)) => {
            let day = opt_date(sub, "today")?.unwrap_or_else(today);
            let owner = if sub.get_flag("all-users") {
                None
            } else {
                Some(out.owner_id)
            };
            let rows = plans.overdue_sweep(owner, day)?;
            if !out.json(&rows)? {
                let data = rows
                    .iter()
                    .map(|o| {
                        vec![
                            o.plan_id.to_string(),
                            o.plan_description.clone(),
                            o.payment.installment_number.to_string(),
                            o.payment.due_date.to_string(),
                            o.days_overdue.to_string(),
                            out.money(o.payment.installment_amount),
                        ]
                    })
                    .collect();
                println!(
                    "{}",
                    pretty_table(&["Plan", "Description", "#", "Due", "Days late", "Amount"], data)
                );
            }
        }
        Some(("list", sub)) => {
            let status = sub
                .get_one::<String>("status")
                .map(|s| PlanStatus::parse(s))
                .transpose()?;
            let rows = plans.list(out.owner_id, status)?;
            print_plans(&out, &rows)?;
        }
        _ => {}
    }
    Ok(())
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn opt_date(sub: &ArgMatches, id: &str) -> Result<Option<NaiveDate>> {
    sub.get_one::<String>(id).map(|s| parse_date(s)).transpose()
}

fn print_plans(out: &Output, plans: &[InstallmentPlan]) -> Result<()> {
    if out.json(&plans)? {
        return Ok(());
    }
    let rows = plans
        .iter()
        .map(|p| {
            vec![
                p.id.to_string(),
                p.description.clone(),
                p.credit_card_account_id.to_string(),
                out.money(p.purchase_amount),
                p.number_of_installments.to_string(),
                format!("{}%", p.interest_rate),
                out.money(p.installment_amount),
                out.money(p.total_amount),
                p.start_date.to_string(),
                p.status.to_string(),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(
            &["ID", "Description", "Card", "Purchase", "N", "Rate", "Installment", "Total", "Start", "Status"],
            rows,
        )
    );
    Ok(())
}

fn print_schedule(out: &Output, schedule: &Schedule) -> Result<()> {
    if out.json(schedule)? {
        return Ok(());
    }
    let rows = schedule
        .rows
        .iter()
        .map(|r| {
            vec![
                r.installment_number.to_string(),
                r.due_date.to_string(),
                out.money(r.installment_amount),
                out.money(r.principal_amount),
                out.money(r.interest_amount),
                out.money(r.remaining_principal),
                r.status.to_string(),
                r.payment_date.map(|d| d.to_string()).unwrap_or_default(),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(
            &["#", "Due", "Installment", "Principal", "Interest", "Remaining", "Status", "Paid on"],
            rows,
        )
    );
    println!(
        "Principal {}  Interest {}  Total {}",
        out.money(schedule.total_principal),
        out.money(schedule.total_interest),
        out.money(schedule.total_amount)
    );
    Ok(())
}
