use super::year::FinancialYear;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Data quality and reference data issues found while computing a report.
/// None of these abort processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type")]
pub enum Warning {
    /// No rate table exists for a year that has activity; its tax is not assessed.
    MissingReferenceData { year: FinancialYear },
    /// A record's date is missing or unparseable; it is excluded from yearly totals.
    UnresolvableDate { record: String },
    /// Sales from a lot exceed the quantity vested.
    InconsistentLot {
        vesting_id: String,
        #[schemars(with = "f64")]
        vested: Decimal,
        #[schemars(with = "f64")]
        sold: Decimal,
        #[schemars(with = "f64")]
        remaining: Decimal,
    },
    /// A quantity, price or income amount is negative.
    NegativeInput { record: String, field: String },
    /// A sale or planned lot references a vesting id that does not exist.
    UnknownLot { record: String, vesting_id: String },
    /// Several vesting records share an id; only the first is used for cost base and balance.
    DuplicateLot { vesting_id: String, records: usize },
}

impl Warning {
    pub fn kind(&self) -> &'static str {
        match self {
            Warning::MissingReferenceData { .. } => "MissingReferenceData",
            Warning::UnresolvableDate { .. } => "UnresolvableDate",
            Warning::InconsistentLot { .. } => "InconsistentLot",
            Warning::NegativeInput { .. } => "NegativeInput",
            Warning::UnknownLot { .. } => "UnknownLot",
            Warning::DuplicateLot { .. } => "DuplicateLot",
        }
    }

    /// The record or year the warning is about
    pub fn subject(&self) -> String {
        match self {
            Warning::MissingReferenceData { year } => year.to_string(),
            Warning::UnresolvableDate { record } => record.clone(),
            Warning::InconsistentLot { vesting_id, .. } => vesting_id.clone(),
            Warning::NegativeInput { record, .. } => record.clone(),
            Warning::UnknownLot { record, .. } => record.clone(),
            Warning::DuplicateLot { vesting_id, .. } => vesting_id.clone(),
        }
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::MissingReferenceData { year } => {
                write!(f, "no rate table for {}, tax not assessed", year)
            }
            Warning::UnresolvableDate { record } => {
                write!(f, "{} has no usable date, excluded from yearly totals", record)
            }
            Warning::InconsistentLot {
                vesting_id,
                vested,
                sold,
                remaining,
            } => write!(
                f,
                "lot {} sold {} of {} vested units (remaining {})",
                vesting_id, sold, vested, remaining
            ),
            Warning::NegativeInput { record, field } => {
                write!(f, "{} has a negative {}", record, field)
            }
            Warning::UnknownLot { record, vesting_id } => {
                write!(f, "{} references unknown lot {}", record, vesting_id)
            }
            Warning::DuplicateLot {
                vesting_id,
                records,
            } => write!(
                f,
                "lot {} appears in {} vesting records, only the first is used",
                vesting_id, records
            ),
        }
    }
}
