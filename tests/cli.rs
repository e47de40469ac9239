//! E2E tests for the rsutax commands

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::io::Write;
use std::process::{Command, Output, Stdio};

fn rsutax(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_rsutax"))
        .args(args)
        .output()
        .expect("Failed to execute command")
}

fn decimal(value: &serde_json::Value) -> Decimal {
    match value {
        serde_json::Value::String(s) => s.parse().expect("decimal string"),
        other => other.to_string().parse().expect("decimal number"),
    }
}

/// Test the text summary lists each financial year
#[test]
fn summary_text() {
    let output = rsutax(&["summary", "tests/data/portfolio.json"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Command failed: {:?}", output);
    assert!(stdout.contains("FINANCIAL YEAR 2023-2024"));
    assert!(stdout.contains("FINANCIAL YEAR 2024-2025"));
    assert!(stdout.contains("Net capital gain: $1375.00"));
    assert!(stdout.contains("18-CapitalGains"));
    assert!(stdout.contains("YEAR ON YEAR"));
}

/// Test JSON summary figures
#[test]
fn summary_json() {
    let output = rsutax(&["summary", "tests/data/portfolio.json", "--json"]);
    assert!(output.status.success(), "Command failed: {:?}", output);

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let fy23 = &json["years"]["2023-2024"];
    assert_eq!(decimal(&fy23["ordinary_income"]), dec!(11000));
    assert_eq!(decimal(&fy23["taxable_income"]), dec!(101000));
    assert_eq!(decimal(&fy23["total_tax"]), dec!(25312));

    let fy24 = &json["years"]["2024-2025"];
    assert_eq!(decimal(&fy24["capital_gains"]["discount"]), dec!(1375));
    assert_eq!(decimal(&fy24["capital_gains"]["net_gain"]), dec!(1375));
    assert_eq!(decimal(&fy24["taxable_income"]), dec!(110375));
    assert_eq!(decimal(&fy24["total_tax"]), dec!(28546.375));

    assert_eq!(json["comparison"].as_array().unwrap().len(), 1);
    assert!(json["warnings"].as_array().unwrap().is_empty());
}

/// Test filtering the summary to one year, using the short label
#[test]
fn summary_single_year_csv() {
    let output = rsutax(&[
        "summary",
        "tests/data/portfolio.json",
        "--year",
        "2024-25",
        "--csv",
    ]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Command failed: {:?}", output);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("year,ordinary_income"));
    assert!(lines[1].starts_with("2024-2025,14000.00,95000.00,1375.00,110375.00"));
}

/// Test reading the input from stdin
#[test]
fn summary_from_stdin() {
    let input = std::fs::read("tests/data/portfolio.json").unwrap();
    let mut child = Command::new(env!("CARGO_BIN_EXE_rsutax"))
        .args(["summary", "-", "--json"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("Failed to spawn command");
    child.stdin.take().unwrap().write_all(&input).unwrap();
    let output = child.wait_with_output().unwrap();

    assert!(output.status.success(), "Command failed: {:?}", output);
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(json["years"]["2024-2025"].is_object());
}

/// Test a year without rate data is still summarised, with a warning
#[test]
fn summary_missing_rates_warns() {
    let output = rsutax(&["summary", "tests/data/fy2025_vesting.json"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Command failed: {:?}", output);
    assert!(stdout.contains("Tax not assessed"));
    assert!(stdout.contains("MissingReferenceData"));
}

/// Test supplying rate tables for a new year
#[test]
fn summary_with_custom_rates() {
    let output = rsutax(&[
        "summary",
        "tests/data/fy2025_vesting.json",
        "--rates",
        "tests/data/rates_fy2025.json",
        "--json",
    ]);
    assert!(output.status.success(), "Command failed: {:?}", output);

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let fy = &json["years"]["2025-2026"];
    assert_eq!(decimal(&fy["assessment"]["income_tax"]), dec!(20788));
    assert_eq!(decimal(&fy["total_tax"]), dec!(22788));
}

/// Test the optimizer ranks the discounted sale first
#[test]
fn optimize_json() {
    let output = rsutax(&["optimize", "tests/data/portfolio.json", "--json"]);
    assert!(output.status.success(), "Command failed: {:?}", output);

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let ranked = json["ranked"].as_array().unwrap();
    assert_eq!(ranked.len(), 4);

    let best = &ranked[0];
    let v2 = best["allocations"]
        .as_array()
        .unwrap()
        .iter()
        .find(|a| a["vesting_id"] == "v2")
        .unwrap();
    assert_eq!(v2["sale_date"], "2025-06-20");
    assert_eq!(v2["held_over_12_months"], true);
    assert!(decimal(&best["after_tax_value"]) >= decimal(&json["baseline"]["after_tax_value"]));
}

/// Test the optimizer table output
#[test]
fn optimize_text() {
    let output = rsutax(&["optimize", "tests/data/portfolio.json", "--top", "2"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Command failed: {:?}", output);
    assert!(stdout.contains("SALE SCENARIOS (4 evaluated)"));
    assert!(stdout.contains("days until discount eligible"));
}

/// Test validate reports every issue and exits non-zero
#[test]
fn validate_reports_issues() {
    let output = rsutax(&["validate", "tests/data/issues.json", "--json"]);
    assert_eq!(output.status.code(), Some(1));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["issue_count"], 4);
    let kinds: Vec<&str> = json["issues"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["type"].as_str().unwrap())
        .collect();
    assert!(kinds.contains(&"UnresolvableDate"));
    assert!(kinds.contains(&"UnknownLot"));
    assert!(kinds.contains(&"InconsistentLot"));
    assert!(kinds.contains(&"MissingReferenceData"));
}

/// Test validate succeeds on clean input
#[test]
fn validate_clean_input() {
    let output = rsutax(&["validate", "tests/data/portfolio.json"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Command failed: {:?}", output);
    assert!(stdout.contains("No issues found"));
}

/// Test the schema describes the input document
#[test]
fn schema_json() {
    let output = rsutax(&["schema"]);
    assert!(output.status.success(), "Command failed: {:?}", output);

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["title"], "TaxInput");
    assert!(json["properties"]["vesting"].is_object());
    assert!(json["properties"]["plan"].is_object());
}

/// Test rate tables print in the format --rates accepts
#[test]
fn rates_json_round_trip() {
    let output = rsutax(&["rates", "--json", "--year", "2024-2025"]);
    assert!(output.status.success(), "Command failed: {:?}", output);

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let tables = json.as_array().unwrap();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0]["year"], "2024-2025");
}
