//! Optimize command - rank sale timings for the planned lots

use super::{format_aud, format_quantity, load_rates, read_input};
use clap::Args;
use rsutax::tax::{open_lots, recommend, AdvisorConfig, Portfolio, Recommendation, ScenarioOutcome};
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Args, Debug)]
pub struct OptimizeCommand {
    /// Input JSON file with a `plan` section. Reads from stdin if not specified.
    #[arg(default_value = "-")]
    file: PathBuf,

    /// Number of ranked scenarios to show
    #[arg(short, long, default_value_t = 5)]
    top: usize,

    /// Flag taxable income within this percentage above a threshold
    #[arg(long, default_value = "2")]
    proximity: Decimal,

    /// Split each lot into this many equal parts
    #[arg(long, default_value_t = 1)]
    tranches: u32,

    /// Evaluate single-date sales only above this many scenarios
    #[arg(long, default_value_t = 20_000)]
    max_scenarios: usize,

    /// Output as JSON instead of formatted text
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Tabled, Serialize)]
struct ScenarioRow {
    #[tabled(rename = "#")]
    rank: usize,
    #[tabled(rename = "Sales")]
    sales: String,
    #[tabled(rename = "Proceeds")]
    proceeds: String,
    #[tabled(rename = "Tax")]
    tax: String,
    #[tabled(rename = "After Tax")]
    after_tax: String,
    #[tabled(rename = "Discount")]
    discount: String,
    #[tabled(rename = "Note")]
    note: String,
}

impl From<&ScenarioOutcome> for ScenarioRow {
    fn from(s: &ScenarioOutcome) -> Self {
        let sales: Vec<String> = s
            .allocations
            .iter()
            .map(|a| {
                format!(
                    "{} x{} @ {}",
                    a.vesting_id,
                    format_quantity(a.quantity),
                    a.sale_date.format("%Y-%m-%d")
                )
            })
            .collect();
        let mut notes = Vec::new();
        if s.is_baseline {
            notes.push("baseline".to_string());
        }
        for p in &s.threshold_proximity {
            notes.push(format!("{} +{:.0} over {}", p.schedule, p.margin, p.threshold));
        }
        ScenarioRow {
            rank: s.rank,
            sales: sales.join("\n"),
            proceeds: format!("{:.2}", s.sale_proceeds),
            tax: format!("{:.2}", s.total_tax),
            after_tax: format!("{:.2}", s.after_tax_value),
            discount: format!("{:.2}", s.claimed_discount),
            note: notes.join("\n"),
        }
    }
}

impl OptimizeCommand {
    pub fn exec(&self, rates: Option<&Path>) -> anyhow::Result<()> {
        let input = read_input(&self.file)?;
        let tables = load_rates(rates)?;
        let Some(plan) = &input.plan else {
            anyhow::bail!("Input has no plan section: add candidate_dates and lots to optimize");
        };

        let (lots, lot_warnings) = open_lots(plan, &input.vesting, &input.sales);
        let config = AdvisorConfig {
            proximity_pct: self.proximity,
            tranches: self.tranches,
            max_scenarios: self.max_scenarios,
        };
        let portfolio = Portfolio {
            vesting: &input.vesting,
            sales: &input.sales,
            other_income: &input.other_income,
            profile: &input.profile,
        };
        let mut recommendation = recommend(&lots, &plan.candidate_dates, portfolio, &tables, &config);
        recommendation.warnings.extend(lot_warnings);

        if self.json {
            println!("{}", serde_json::to_string_pretty(&recommendation)?);
        } else {
            self.print_recommendation(&recommendation);
        }
        Ok(())
    }

    fn print_recommendation(&self, rec: &Recommendation) {
        if rec.ranked.is_empty() {
            println!("No scenarios to evaluate (check plan lots and candidate dates)");
            print_warnings(rec);
            return;
        }

        println!();
        println!(
            "SALE SCENARIOS ({} evaluated{})",
            rec.ranked.len(),
            if rec.exhaustive { "" } else { ", single-date only" }
        );
        println!();

        let rows: Vec<ScenarioRow> = rec.ranked.iter().take(self.top).map(ScenarioRow::from).collect();
        let table = Table::new(rows)
            .with(Style::rounded())
            .with(Modify::new(Rows::new(1..)).with(Alignment::right()))
            .to_string();
        println!("{}", table);

        if let (Some(best), Some(baseline)) = (rec.best(), rec.baseline.as_ref()) {
            println!(
                "  Best vs selling everything on the earliest date: {}",
                format_aud(best.after_tax_value - baseline.after_tax_value)
            );
        }
        println!();

        let flagged: Vec<ScenarioRow> = rec
            .threshold_sensitive()
            .filter(|s| s.rank > self.top)
            .map(ScenarioRow::from)
            .collect();
        if !flagged.is_empty() {
            println!("THRESHOLD-SENSITIVE (outside top {})", self.top);
            let table = Table::new(flagged)
                .with(Style::rounded())
                .with(Modify::new(Rows::new(1..)).with(Alignment::right()))
                .to_string();
            println!("{}", table);
            println!();
        }

        println!("LOTS");
        for lot in &rec.lots {
            let timing = match lot.days_until_discount {
                Some(0) => "discount eligible".to_string(),
                Some(days) => format!("{} days until discount eligible", days),
                None => "no vest date".to_string(),
            };
            println!("  {} x{}: {}", lot.vesting_id, format_quantity(lot.quantity), timing);
        }
        println!();

        print_warnings(rec);
    }
}

fn print_warnings(rec: &Recommendation) {
    if rec.warnings.is_empty() {
        return;
    }
    println!("WARNINGS ({})", rec.warnings.len());
    for w in &rec.warnings {
        println!("  [{}] {}", w.kind(), w);
    }
    println!();
}
