use chrono::{Datelike, NaiveDate};
use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum YearLabelError {
    #[error("invalid financial year label: {0}")]
    Invalid(String),
    #[error("financial year label does not span consecutive years: {0}")]
    NotConsecutive(String),
}

/// Australian financial year (runs 1 July to 30 June)
/// The year value represents the start year (e.g., 2024 = 2024-2025 financial year)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FinancialYear(pub i32);

impl FinancialYear {
    /// Create a financial year from a date
    pub fn from_date(date: NaiveDate) -> Self {
        // July to December belongs to the year starting this July,
        // January to June to the year that started last July
        if date.month() >= 7 {
            FinancialYear(date.year())
        } else {
            FinancialYear(date.year() - 1)
        }
    }

    /// Start date of the financial year (1 July)
    pub fn start_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.0, 7, 1)
    }

    /// End date of the financial year (30 June)
    pub fn end_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.0 + 1, 6, 30)
    }

    pub fn next(&self) -> FinancialYear {
        FinancialYear(self.0 + 1)
    }

    /// Display as "2024-2025" format
    pub fn label(&self) -> String {
        format!("{}-{}", self.0, self.0 + 1)
    }

    /// Display as "2024-25" format, as used on ATO publications
    pub fn short_label(&self) -> String {
        format!("{}-{:02}", self.0, (self.0 + 1).rem_euclid(100))
    }
}

impl std::fmt::Display for FinancialYear {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for FinancialYear {
    type Err = YearLabelError;

    /// Accepts "2024-2025", "2024-25" and "2024/25"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || YearLabelError::Invalid(s.to_string());

        let (start, end) = s.split_once(['-', '/']).ok_or_else(invalid)?;
        if start.len() != 4 {
            return Err(invalid());
        }
        let start: i32 = start.parse().map_err(|_| invalid())?;
        let end_value: i32 = end.parse().map_err(|_| invalid())?;

        let consecutive = match end.len() {
            4 => end_value == start + 1,
            2 => end_value == (start + 1).rem_euclid(100),
            _ => return Err(invalid()),
        };
        if !consecutive {
            return Err(YearLabelError::NotConsecutive(s.to_string()));
        }
        Ok(FinancialYear(start))
    }
}

impl Serialize for FinancialYear {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label())
    }
}

impl<'de> Deserialize<'de> for FinancialYear {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s: String = Deserialize::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl JsonSchema for FinancialYear {
    fn schema_name() -> String {
        "FinancialYear".to_string()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        <String as JsonSchema>::json_schema(gen)
    }
}

/// Result of resolving a record's date to a financial year
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum YearLabel {
    Resolved(FinancialYear),
    /// The record had no usable date and cannot be bucketed
    Unresolved,
}

impl YearLabel {
    pub fn year(self) -> Option<FinancialYear> {
        match self {
            YearLabel::Resolved(year) => Some(year),
            YearLabel::Unresolved => None,
        }
    }
}

impl std::fmt::Display for YearLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            YearLabel::Resolved(year) => write!(f, "{}", year),
            YearLabel::Unresolved => write!(f, "Unresolved"),
        }
    }
}

/// Resolve an optional record date to its financial year
pub fn resolve(date: Option<NaiveDate>) -> YearLabel {
    match date {
        Some(date) => YearLabel::Resolved(FinancialYear::from_date(date)),
        None => YearLabel::Unresolved,
    }
}

/// Days from `date` until the next financial year starts (the following 1 July)
pub fn days_to_next_financial_year(date: NaiveDate) -> i64 {
    let next_start = FinancialYear::from_date(date).next().start_date();
    next_start.map_or(0, |start| (start - date).num_days())
}

/// Whether a holding qualifies for the CGT discount (held for more than 365 days)
pub fn is_long_term_holding(acquired: NaiveDate, disposed: NaiveDate) -> bool {
    (disposed - acquired).num_days() > 365
}
