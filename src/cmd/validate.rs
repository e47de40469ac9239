//! Validate command - surface data quality issues without generating full reports

use super::{load_rates, read_input};
use clap::Args;
use rsutax::tax::{open_lots, summarize, Warning};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Args, Debug)]
pub struct ValidateCommand {
    /// Input JSON file. Reads from stdin if not specified.
    #[arg(default_value = "-")]
    file: PathBuf,

    /// Output as JSON instead of formatted text
    #[arg(long)]
    json: bool,
}

/// JSON output structure
#[derive(Debug, Serialize)]
struct ValidationOutput<'a> {
    issue_count: usize,
    issues: &'a [Warning],
}

impl ValidateCommand {
    pub fn exec(&self, rates: Option<&Path>) -> anyhow::Result<()> {
        let input = read_input(&self.file)?;
        let tables = load_rates(rates)?;
        let report = summarize(
            &input.vesting,
            &input.sales,
            &tables,
            &input.other_income,
            &input.profile,
        );

        let mut issues = report.warnings;
        if let Some(plan) = &input.plan {
            let (_, plan_warnings) = open_lots(plan, &input.vesting, &input.sales);
            issues.extend(plan_warnings);
        }

        if self.json {
            let output = ValidationOutput {
                issue_count: issues.len(),
                issues: &issues,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            print_text(&issues);
        }

        // Exit with code 1 if issues found
        if !issues.is_empty() {
            std::process::exit(1);
        }
        Ok(())
    }
}

fn print_text(issues: &[Warning]) {
    if issues.is_empty() {
        println!("No issues found");
        return;
    }

    println!();
    println!("VALIDATION ISSUES ({})", issues.len());
    println!();
    for issue in issues {
        println!("  {:22} {:24} {}", issue.kind(), issue.subject(), issue);
    }
    println!();
}
