//! Rates command - show the rate tables in use

use super::{format_pct, load_rates};
use clap::Args;
use rsutax::tax::{FinancialYear, RateTables, TaxYearRateTable};
use std::path::Path;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Args, Debug)]
pub struct RatesCommand {
    /// Only show this financial year (e.g. 2024-25)
    #[arg(short, long)]
    year: Option<FinancialYear>,

    /// Output as JSON (the format accepted by --rates)
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Tabled)]
struct BracketRow {
    #[tabled(rename = "Schedule")]
    schedule: &'static str,
    #[tabled(rename = "Threshold")]
    threshold: String,
    #[tabled(rename = "Rate")]
    rate: String,
}

impl RatesCommand {
    pub fn exec(&self, rates: Option<&Path>) -> anyhow::Result<()> {
        let tables = load_rates(rates)?;
        let tables = match self.year {
            Some(year) => RateTables::new([tables.get(year)?.clone()])?,
            None => tables,
        };

        if self.json {
            println!("{}", tables.to_json_pretty()?);
            return Ok(());
        }

        for year in tables.years() {
            let table = tables.get(year)?;
            print_table(table);
        }
        Ok(())
    }
}

fn print_table(table: &TaxYearRateTable) {
    println!();
    println!(
        "FINANCIAL YEAR {} (Medicare levy {})",
        table.year,
        format_pct(table.medicare_levy_rate)
    );

    let schedules = [
        ("Income tax", &table.income_tax),
        ("Medicare surcharge", &table.medicare_surcharge),
        ("HECS/HELP", &table.help_repayment),
    ];
    let rows: Vec<BracketRow> = schedules
        .into_iter()
        .flat_map(|(schedule, brackets)| {
            brackets.iter().map(move |b| BracketRow {
                schedule,
                threshold: format!("{:.0}", b.threshold),
                rate: format_pct(b.rate),
            })
        })
        .collect();

    let rendered = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Rows::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{}", rendered);
}
