//! Year-keyed reference rate tables
//!
//! Each financial year has one immutable [`TaxYearRateTable`]. Tables for a new
//! year are added as new entries; existing entries are never edited in place.

use super::year::FinancialYear;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RateTableError {
    #[error("no rate table for financial year {0}")]
    MissingReferenceData(FinancialYear),
    #[error("rate table {year} has no income tax brackets")]
    NoBrackets { year: FinancialYear },
    #[error("rate table {year} {schedule} thresholds are not in ascending order")]
    UnorderedThresholds {
        year: FinancialYear,
        schedule: &'static str,
    },
}

/// A (threshold, rate) step in one of the schedules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Bracket {
    /// Income above this amount is subject to `rate`
    #[schemars(with = "f64")]
    pub threshold: Decimal,
    /// Rate as a fraction (0.325 = 32.5%)
    #[schemars(with = "f64")]
    pub rate: Decimal,
}

impl Bracket {
    pub const fn new(threshold: Decimal, rate: Decimal) -> Self {
        Bracket { threshold, rate }
    }
}

/// Income tax, Medicare and HELP schedules for a single financial year
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TaxYearRateTable {
    pub year: FinancialYear,
    /// Marginal income tax brackets, ascending by threshold
    pub income_tax: Vec<Bracket>,
    /// Flat Medicare levy rate
    #[schemars(with = "f64")]
    pub medicare_levy_rate: Decimal,
    /// Medicare levy surcharge tiers, ascending by threshold
    #[serde(default)]
    pub medicare_surcharge: Vec<Bracket>,
    /// HECS/HELP repayment brackets, ascending by threshold
    #[serde(default)]
    pub help_repayment: Vec<Bracket>,
}

impl TaxYearRateTable {
    /// Check ordering invariants the calculators rely on
    pub fn validate(&self) -> Result<(), RateTableError> {
        if self.income_tax.is_empty() {
            return Err(RateTableError::NoBrackets { year: self.year });
        }
        let schedules: [(&'static str, &[Bracket]); 3] = [
            ("income tax", &self.income_tax),
            ("medicare surcharge", &self.medicare_surcharge),
            ("help repayment", &self.help_repayment),
        ];
        for (schedule, brackets) in schedules {
            if brackets.windows(2).any(|w| w[0].threshold >= w[1].threshold) {
                return Err(RateTableError::UnorderedThresholds {
                    year: self.year,
                    schedule,
                });
            }
        }
        Ok(())
    }

    /// Every threshold at which a schedule changes rate, used for proximity checks
    pub fn boundaries(&self) -> impl Iterator<Item = (Schedule, Decimal)> + '_ {
        let income_tax = self
            .income_tax
            .iter()
            .filter(|b| b.threshold > Decimal::ZERO)
            .map(|b| (Schedule::IncomeTax, b.threshold));
        let surcharge = self
            .medicare_surcharge
            .iter()
            .filter(|b| b.rate > Decimal::ZERO)
            .map(|b| (Schedule::MedicareSurcharge, b.threshold));
        let help = self
            .help_repayment
            .iter()
            .filter(|b| b.rate > Decimal::ZERO)
            .map(|b| (Schedule::HelpRepayment, b.threshold));
        income_tax.chain(surcharge).chain(help)
    }
}

/// Which schedule a threshold belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Schedule {
    IncomeTax,
    MedicareSurcharge,
    HelpRepayment,
}

impl Schedule {
    pub fn display(&self) -> &'static str {
        match self {
            Schedule::IncomeTax => "Income tax",
            Schedule::MedicareSurcharge => "Medicare surcharge",
            Schedule::HelpRepayment => "HECS/HELP",
        }
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// Immutable lookup of rate tables by financial year
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateTables {
    tables: BTreeMap<FinancialYear, TaxYearRateTable>,
}

impl RateTables {
    /// Build from a list of tables. Later entries for the same year are rejected
    /// in favour of the first, so an existing year is never overwritten.
    pub fn new(tables: impl IntoIterator<Item = TaxYearRateTable>) -> Result<Self, RateTableError> {
        let mut map = BTreeMap::new();
        for table in tables {
            table.validate()?;
            if map.contains_key(&table.year) {
                log::warn!("Ignoring duplicate rate table for {}", table.year);
                continue;
            }
            map.insert(table.year, table);
        }
        Ok(RateTables { tables: map })
    }

    /// Look up the table for a year
    pub fn get(&self, year: FinancialYear) -> Result<&TaxYearRateTable, RateTableError> {
        self.tables
            .get(&year)
            .ok_or(RateTableError::MissingReferenceData(year))
    }

    pub fn years(&self) -> impl Iterator<Item = FinancialYear> + '_ {
        self.tables.keys().copied()
    }

    /// Return a copy extended with a table for a new year
    pub fn with_table(&self, table: TaxYearRateTable) -> Result<Self, RateTableError> {
        RateTables::new(self.tables.values().cloned().chain(std::iter::once(table)))
    }

    /// Read a JSON array of rate tables
    pub fn read_json<R: Read>(reader: R) -> anyhow::Result<Self> {
        let tables: Vec<TaxYearRateTable> = serde_json::from_reader(reader)?;
        Ok(RateTables::new(tables)?)
    }

    pub fn to_json_pretty(&self) -> anyhow::Result<String> {
        let tables: Vec<&TaxYearRateTable> = self.tables.values().collect();
        Ok(serde_json::to_string_pretty(&tables)?)
    }

    /// Built-in resident individual rates
    pub fn australian() -> Self {
        let tables = [fy2023_24(), fy2024_25()]
            .into_iter()
            .map(|t| (t.year, t))
            .collect();
        RateTables { tables }
    }
}

fn resident_income_tax() -> Vec<Bracket> {
    vec![
        Bracket::new(dec!(0), dec!(0)),
        Bracket::new(dec!(18200), dec!(0.19)),
        Bracket::new(dec!(45000), dec!(0.325)),
        Bracket::new(dec!(120000), dec!(0.37)),
        Bracket::new(dec!(180000), dec!(0.45)),
    ]
}

fn fy2023_24() -> TaxYearRateTable {
    TaxYearRateTable {
        year: FinancialYear(2023),
        income_tax: resident_income_tax(),
        medicare_levy_rate: dec!(0.02),
        medicare_surcharge: vec![
            Bracket::new(dec!(0), dec!(0)),
            Bracket::new(dec!(93000), dec!(0.01)),
            Bracket::new(dec!(108000), dec!(0.0125)),
            Bracket::new(dec!(144000), dec!(0.015)),
        ],
        help_repayment: help_schedule(&[
            dec!(51550),
            dec!(59519),
            dec!(63090),
            dec!(66876),
            dec!(70889),
            dec!(75141),
            dec!(79650),
            dec!(84430),
            dec!(89495),
            dec!(94866),
            dec!(100558),
            dec!(106591),
            dec!(112986),
            dec!(119765),
            dec!(126951),
            dec!(134569),
            dec!(142643),
            dec!(151201),
        ]),
    }
}

fn fy2024_25() -> TaxYearRateTable {
    TaxYearRateTable {
        year: FinancialYear(2024),
        income_tax: resident_income_tax(),
        medicare_levy_rate: dec!(0.02),
        medicare_surcharge: vec![
            Bracket::new(dec!(0), dec!(0)),
            Bracket::new(dec!(97000), dec!(0.01)),
            Bracket::new(dec!(113000), dec!(0.0125)),
            Bracket::new(dec!(151000), dec!(0.015)),
        ],
        help_repayment: help_schedule(&[
            dec!(54435),
            dec!(62851),
            dec!(66621),
            dec!(70619),
            dec!(74856),
            dec!(79347),
            dec!(84108),
            dec!(89155),
            dec!(94504),
            dec!(100175),
            dec!(106186),
            dec!(112557),
            dec!(119310),
            dec!(126468),
            dec!(134057),
            dec!(142101),
            dec!(150627),
            dec!(159664),
        ]),
    }
}

/// HELP repayment rates step 1%, 2%, then by 0.5% up to 10%
fn help_schedule(thresholds: &[Decimal]) -> Vec<Bracket> {
    let mut brackets = vec![Bracket::new(dec!(0), dec!(0))];
    for (i, threshold) in thresholds.iter().enumerate() {
        let rate = match i {
            0 => dec!(0.01),
            _ => dec!(0.02) + Decimal::from(i as u32 - 1) * dec!(0.005),
        };
        brackets.push(Bracket::new(*threshold, rate));
    }
    brackets
}
