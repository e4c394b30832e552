// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use clap::{Arg, ArgAction, Command, value_parser};

fn id_arg(name: &'static str) -> Arg {
    Arg::new(name).required(true).value_parser(value_parser!(i64))
}

fn date_arg(name: &'static str, long: &'static str) -> Arg {
    Arg::new(name)
        .long(long)
        .value_name("YYYY-MM-DD")
}

/// Arguments shared by `tx add` and `tx update`.
fn posting_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("kind")
            .long("kind")
            .required(true)
            .help("income | expense | transfer | saving"),
    )
    .arg(
        Arg::new("from")
            .long("from")
            .required(true)
            .value_parser(value_parser!(i64))
            .help("Origin account id"),
    )
    .arg(
        Arg::new("to")
            .long("to")
            .value_parser(value_parser!(i64))
            .help("Destination account id (transfers)"),
    )
    .arg(Arg::new("category").long("category").value_parser(value_parser!(i64)))
    .arg(Arg::new("goal").long("goal").value_parser(value_parser!(i64)))
    .arg(date_arg("date", "date").required(true))
    .arg(
        Arg::new("base")
            .long("base")
            .conflicts_with("total")
            .help("Pre-tax amount"),
    )
    .arg(Arg::new("total").long("total").help("Gross amount including tax"))
    .arg(Arg::new("tax").long("tax").help("VAT percentage, 0-30"))
    .arg(
        Arg::new("capital")
            .long("capital")
            .help("Capital part of a credit-card payment"),
    )
    .arg(Arg::new("currency").long("currency").requires_all(["rate", "original"]))
    .arg(Arg::new("rate").long("rate").help("Account-currency units per transaction-currency unit"))
    .arg(Arg::new("original").long("original").help("Amount in the transaction currency"))
    .arg(Arg::new("description").long("description"))
    .arg(Arg::new("tag").long("tag"))
    .arg(Arg::new("note").long("note"))
    .arg(Arg::new("rule").long("rule").value_parser(value_parser!(i64)))
}

pub fn build_cli() -> Command {
    Command::new("ledgerline")
        .about("Personal ledger with credit-card installment plans")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("user")
                .long("user")
                .global(true)
                .default_value("1")
                .value_parser(value_parser!(i64))
                .help("Owner id the command acts for"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("jsonl")
                .long("jsonl")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("minor")
                .long("minor")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Read and print amounts as integer minor units"),
        )
        .subcommand(Command::new("init").about("Create the database"))
        .subcommand(
            Command::new("account")
                .about("Accounts")
                .subcommand(
                    Command::new("add")
                        .arg(Arg::new("name").required(true))
                        .arg(Arg::new("type").long("type").required(true))
                        .arg(Arg::new("category").long("category").required(true))
                        .arg(Arg::new("currency").long("currency").required(true))
                        .arg(
                            Arg::new("opening")
                                .long("opening")
                                .allow_hyphen_values(true)
                                .help("Opening balance; liabilities are negative"),
                        )
                        .arg(Arg::new("limit").long("limit"))
                        .arg(Arg::new("number").long("number"))
                        .arg(Arg::new("description").long("description"))
                        .arg(
                            Arg::new("gmf-exempt")
                                .long("gmf-exempt")
                                .action(ArgAction::SetTrue),
                        ),
                )
                .subcommand(
                    Command::new("list").arg(
                        Arg::new("all")
                            .long("all")
                            .action(ArgAction::SetTrue)
                            .help("Include inactive accounts"),
                    ),
                )
                .subcommand(Command::new("show").arg(id_arg("id")))
                .subcommand(
                    Command::new("update")
                        .arg(id_arg("id"))
                        .arg(Arg::new("name").long("name"))
                        .arg(Arg::new("description").long("description"))
                        .arg(Arg::new("number").long("number"))
                        .arg(Arg::new("limit").long("limit"))
                        .arg(
                            Arg::new("gmf-exempt")
                                .long("gmf-exempt")
                                .value_parser(value_parser!(bool)),
                        )
                        .arg(
                            Arg::new("active")
                                .long("active")
                                .value_parser(value_parser!(bool)),
                        ),
                )
                .subcommand(
                    Command::new("adjust")
                        .about("Set a balance directly, keeping an audit row")
                        .arg(id_arg("id"))
                        .arg(Arg::new("balance").required(true).allow_hyphen_values(true))
                        .arg(Arg::new("reason").long("reason")),
                )
                .subcommand(Command::new("history").arg(id_arg("id")))
                .subcommand(Command::new("deactivate").arg(id_arg("id")))
                .subcommand(Command::new("rm").arg(id_arg("id"))),
        )
        .subcommand(
            Command::new("category")
                .about("Income and expense categories")
                .subcommand(
                    Command::new("add")
                        .arg(Arg::new("name").required(true))
                        .arg(Arg::new("kind").long("kind").required(true)),
                )
                .subcommand(Command::new("list").arg(Arg::new("kind").long("kind")))
                .subcommand(Command::new("rm").arg(id_arg("id"))),
        )
        .subcommand(
            Command::new("tx")
                .about("Transactions")
                .subcommand(posting_args(Command::new("add")))
                .subcommand(posting_args(Command::new("update").arg(id_arg("id"))))
                .subcommand(Command::new("show").arg(id_arg("id")))
                .subcommand(Command::new("rm").arg(id_arg("id")))
                .subcommand(
                    Command::new("list")
                        .arg(Arg::new("kind").long("kind"))
                        .arg(Arg::new("account").long("account").value_parser(value_parser!(i64)))
                        .arg(
                            Arg::new("destination")
                                .long("destination")
                                .value_parser(value_parser!(i64)),
                        )
                        .arg(Arg::new("category").long("category").value_parser(value_parser!(i64)))
                        .arg(date_arg("from", "from"))
                        .arg(date_arg("to", "to"))
                        .arg(Arg::new("min").long("min"))
                        .arg(Arg::new("max").long("max"))
                        .arg(Arg::new("text").long("text"))
                        .arg(
                            Arg::new("order")
                                .long("order")
                                .help("date | date-desc | total | total-desc"),
                        )
                        .arg(Arg::new("limit").long("limit").value_parser(value_parser!(usize))),
                ),
        )
        .subcommand(
            Command::new("goal")
                .about("Savings goals")
                .subcommand(
                    Command::new("add")
                        .arg(Arg::new("name").required(true))
                        .arg(Arg::new("currency").long("currency").required(true))
                        .arg(Arg::new("target").long("target").required(true)),
                )
                .subcommand(Command::new("list"))
                .subcommand(Command::new("show").arg(id_arg("id")))
                .subcommand(
                    Command::new("update")
                        .arg(id_arg("id"))
                        .arg(Arg::new("name").long("name"))
                        .arg(Arg::new("target").long("target")),
                )
                .subcommand(Command::new("rm").arg(id_arg("id"))),
        )
        .subcommand(
            Command::new("plan")
                .about("Credit-card installment plans")
                .subcommand(
                    Command::new("create")
                        .arg(
                            Arg::new("purchase")
                                .long("purchase")
                                .required(true)
                                .value_parser(value_parser!(i64)),
                        )
                        .arg(
                            Arg::new("installments")
                                .long("installments")
                                .required(true)
                                .value_parser(value_parser!(u32)),
                        )
                        .arg(Arg::new("rate").long("rate").required(true).help("Percent per period"))
                        .arg(date_arg("start", "start").required(true))
                        .arg(
                            Arg::new("financing-category")
                                .long("financing-category")
                                .required(true)
                                .value_parser(value_parser!(i64)),
                        )
                        .arg(Arg::new("description").long("description")),
                )
                .subcommand(
                    Command::new("preview")
                        .arg(Arg::new("amount").long("amount").required(true))
                        .arg(
                            Arg::new("installments")
                                .long("installments")
                                .required(true)
                                .value_parser(value_parser!(u32)),
                        )
                        .arg(Arg::new("rate").long("rate").required(true))
                        .arg(date_arg("start", "start").required(true)),
                )
                .subcommand(
                    Command::new("schedule")
                        .arg(id_arg("id"))
                        .arg(date_arg("as-of", "as-of")),
                )
                .subcommand(
                    Command::new("pay")
                        .arg(id_arg("id"))
                        .arg(
                            Arg::new("installment")
                                .required(true)
                                .value_parser(value_parser!(u32)),
                        )
                        .arg(date_arg("date", "date").required(true))
                        .arg(
                            Arg::new("from")
                                .long("from")
                                .required(true)
                                .value_parser(value_parser!(i64)),
                        )
                        .arg(Arg::new("notes").long("notes")),
                )
                .subcommand(
                    Command::new("update")
                        .arg(id_arg("id"))
                        .arg(
                            Arg::new("installments")
                                .long("installments")
                                .value_parser(value_parser!(u32)),
                        )
                        .arg(Arg::new("rate").long("rate"))
                        .arg(date_arg("start", "start"))
                        .arg(Arg::new("description").long("description")),
                )
                .subcommand(Command::new("cancel").arg(id_arg("id")))
                .subcommand(
                    Command::new("overdue")
                        .arg(date_arg("today", "today"))
                        .arg(
                            Arg::new("all-users")
                                .long("all-users")
                                .action(ArgAction::SetTrue),
                        ),
                )
                .subcommand(Command::new("list").arg(Arg::new("status").long("status"))),
        )
        .subcommand(
            Command::new("fx")
                .about("Exchange rates and base currency")
                .subcommand(Command::new("set-base").arg(Arg::new("currency").required(true)))
                .subcommand(Command::new("base"))
                .subcommand(
                    Command::new("add")
                        .arg(Arg::new("base").required(true))
                        .arg(Arg::new("quote").required(true))
                        .arg(Arg::new("month").required(true).value_name("YYYY-MM"))
                        .arg(Arg::new("rate").required(true))
                        .arg(Arg::new("source").long("source")),
                )
                .subcommand(
                    Command::new("list")
                        .arg(Arg::new("base").long("base"))
                        .arg(Arg::new("quote").long("quote")),
                )
                .subcommand(Command::new("rm").arg(id_arg("id")))
                .subcommand(
                    Command::new("rate")
                        .arg(Arg::new("from").required(true))
                        .arg(Arg::new("to").required(true))
                        .arg(date_arg("date", "date")),
                )
                .subcommand(
                    Command::new("convert")
                        .arg(Arg::new("amount").required(true))
                        .arg(Arg::new("from").required(true))
                        .arg(Arg::new("to").required(true))
                        .arg(date_arg("date", "date")),
                )
                .subcommand(
                    Command::new("import")
                        .about("Load base,quote,month,rate[,source] rows from CSV")
                        .arg(Arg::new("file").required(true)),
                ),
        )
        .subcommand(
            Command::new("settings")
                .about("Engine configuration")
                .subcommand(Command::new("show"))
                .subcommand(
                    Command::new("set")
                        .arg(Arg::new("key").required(true))
                        .arg(Arg::new("value").required(true)),
                ),
        )
        .subcommand(Command::new("doctor").about("Check stored data for inconsistencies"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_tree_is_consistent() {
        build_cli().debug_assert();
    }
}
