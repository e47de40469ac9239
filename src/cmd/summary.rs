//! Summary command - per-year income, capital gains and tax

use super::{format_aud, format_opt_aud, format_pct, format_quantity, load_rates, read_input};
use clap::Args;
use rsutax::tax::{summarize, FinancialYear, YearReport, YearSummary};
use rust_decimal::Decimal;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Args, Debug)]
pub struct SummaryCommand {
    /// Input JSON file. Reads from stdin if not specified.
    #[arg(default_value = "-")]
    file: PathBuf,

    /// Financial year to report (e.g. 2024-25)
    #[arg(short, long)]
    year: Option<FinancialYear>,

    /// Output as JSON instead of formatted text
    #[arg(long, conflicts_with = "csv")]
    json: bool,

    /// Output one CSV row per financial year
    #[arg(long)]
    csv: bool,
}

/// Row for the year table and CSV output
#[derive(Debug, Clone, Tabled, Serialize)]
struct YearRow {
    #[tabled(rename = "Year")]
    year: String,
    #[tabled(rename = "Vesting Income")]
    ordinary_income: String,
    #[tabled(rename = "Other Income")]
    other_income: String,
    #[tabled(rename = "Net CG")]
    net_capital_gain: String,
    #[tabled(rename = "Taxable")]
    taxable_income: String,
    #[tabled(rename = "Total Tax")]
    total_tax: String,
    #[tabled(rename = "Proceeds")]
    sale_proceeds: String,
    #[tabled(rename = "Net Value")]
    net_after_tax_value: String,
}

impl From<&YearSummary> for YearRow {
    fn from(s: &YearSummary) -> Self {
        YearRow {
            year: s.year.to_string(),
            ordinary_income: format!("{:.2}", s.ordinary_income),
            other_income: format!("{:.2}", s.other_income),
            net_capital_gain: format!("{:.2}", s.capital_gains.net_gain),
            taxable_income: format!("{:.2}", s.taxable_income),
            total_tax: s.total_tax.map_or(String::new(), |t| format!("{:.2}", t)),
            sale_proceeds: format!("{:.2}", s.sale_proceeds),
            net_after_tax_value: s
                .net_after_tax_value
                .map_or(String::new(), |v| format!("{:.2}", v)),
        }
    }
}

impl SummaryCommand {
    pub fn exec(&self, rates: Option<&Path>) -> anyhow::Result<()> {
        let input = read_input(&self.file)?;
        let tables = load_rates(rates)?;
        let mut report = summarize(
            &input.vesting,
            &input.sales,
            &tables,
            &input.other_income,
            &input.profile,
        );

        if let Some(year) = self.year {
            if !report.years.contains_key(&year) {
                anyhow::bail!("No activity in financial year {}", year);
            }
            report.years.retain(|y, _| *y == year);
            report
                .comparison
                .retain(|c| c.from == year || c.to == year);
        }

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        } else if self.csv {
            self.write_csv(&report)
        } else {
            self.print_summary(&report);
            Ok(())
        }
    }

    fn write_csv(&self, report: &YearReport) -> anyhow::Result<()> {
        let mut wtr = csv::Writer::from_writer(io::stdout());
        for summary in report.years.values() {
            wtr.serialize(YearRow::from(summary))?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn print_summary(&self, report: &YearReport) {
        if report.years.is_empty() {
            println!("No vesting, sales or income found");
            print_warnings(report);
            return;
        }

        for summary in report.years.values() {
            print_year(summary);
        }

        if report.years.len() > 1 {
            let rows: Vec<YearRow> = report.years.values().map(YearRow::from).collect();
            println!("ALL YEARS");
            let table = Table::new(rows)
                .with(Style::rounded())
                .with(Modify::new(Rows::new(1..)).with(Alignment::right()))
                .to_string();
            println!("{}", table);
            println!();
        }

        if !report.comparison.is_empty() {
            println!("YEAR ON YEAR");
            for c in &report.comparison {
                println!(
                    "  {} -> {}: taxable {} | tax {} | net value {}",
                    c.from,
                    c.to,
                    format_aud(c.taxable_income_change),
                    format_opt_aud(c.total_tax_change),
                    format_opt_aud(c.net_value_change)
                );
            }
            println!();
        }

        let unsold: Vec<_> = report
            .lots
            .iter()
            .filter(|(_, b)| b.remaining() != Decimal::ZERO)
            .collect();
        if !unsold.is_empty() {
            println!("UNSOLD UNITS");
            for (id, balance) in unsold {
                println!(
                    "  {}: {} of {} vested",
                    id,
                    format_quantity(balance.remaining()),
                    format_quantity(balance.vested)
                );
            }
            println!();
        }

        print_warnings(report);
    }
}

fn print_year(s: &YearSummary) {
    println!();
    println!("FINANCIAL YEAR {}", s.year);
    println!();
    println!(
        "  Vesting income: {} ({} events) | Other income: {}",
        format_aud(s.ordinary_income),
        s.vesting_count,
        format_aud(s.other_income)
    );

    let cg = &s.capital_gains;
    println!(
        "  Sales: {} | Proceeds: {} | Raw gain: {}",
        s.sale_count,
        format_aud(s.sale_proceeds),
        format_aud(s.gross_capital_gain())
    );
    println!(
        "  Losses applied: {} | Discount: {} | Net capital gain: {} | Carried forward: {}",
        format_aud(cg.losses_applied()),
        format_aud(cg.discount),
        format_aud(cg.net_gain),
        format_aud(cg.carried_forward)
    );
    println!("  Taxable income: {}", format_aud(s.taxable_income));

    match &s.assessment {
        Some(a) => {
            println!(
                "  Income tax: {} (marginal {}) | Medicare: {} | Surcharge: {} | HELP: {}",
                format_aud(a.income_tax),
                format_pct(a.marginal_rate),
                format_aud(a.medicare_levy),
                format_aud(a.medicare_surcharge),
                format_aud(a.help_repayment)
            );
            println!(
                "  TOTAL TAX: {} | Withheld: {} | Remaining: {}",
                format_aud(a.total()),
                format_aud(s.tax_withheld),
                format_opt_aud(s.remaining_tax_payable)
            );
        }
        None => println!("  Tax not assessed: no rate table for {}", s.year),
    }

    let items: Vec<String> = s
        .ato_items()
        .iter()
        .map(|i| format!("{} {}", i.code, format_aud(i.amount)))
        .collect();
    println!("  Return items: {}", items.join(" | "));
    println!(
        "  Net after-tax value: {}",
        format_opt_aud(s.net_after_tax_value)
    );
    println!();
}

fn print_warnings(report: &YearReport) {
    if report.warnings.is_empty() {
        return;
    }
    println!("WARNINGS ({})", report.warnings.len());
    for w in &report.warnings {
        println!("  [{}] {}", w.kind(), w);
    }
    println!();
}
