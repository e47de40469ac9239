use crate::tax::year::{self, FinancialYear, YearLabel};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::io::Read;

/// Unified JSON input format
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct TaxInput {
    /// RSU vesting records
    #[serde(default)]
    pub vesting: Vec<VestingEvent>,
    /// Sales of previously vested units
    #[serde(default)]
    pub sales: Vec<SaleEvent>,
    /// Income from other sources (salary etc.), keyed by financial year label
    #[serde(default)]
    #[schemars(with = "BTreeMap<String, f64>")]
    pub other_income: BTreeMap<FinancialYear, Decimal>,
    #[serde(default)]
    pub profile: TaxProfile,
    /// Unsold lots and dates to evaluate with the `optimize` command
    #[serde(default)]
    pub plan: Option<SalePlan>,
}

/// Units vested on a single date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct VestingEvent {
    /// Unique identifier, referenced by sales of this lot
    pub id: String,
    /// Vesting date (YYYY-MM-DD). Missing or unparseable dates are reported, not fatal.
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    #[schemars(with = "Option<String>")]
    pub vest_date: Option<NaiveDate>,
    /// Number of units vested
    #[schemars(with = "f64")]
    pub quantity: Decimal,
    /// Fair market value per unit at vesting, also the cost base for later sales
    #[schemars(with = "f64")]
    pub fmv_per_unit: Decimal,
    #[serde(default)]
    pub description: Option<String>,
}

impl VestingEvent {
    /// Ordinary income recognised at vesting
    pub fn gross_value(&self) -> Decimal {
        self.quantity * self.fmv_per_unit
    }

    pub fn year_label(&self) -> YearLabel {
        year::resolve(self.vest_date)
    }
}

/// Units from one vesting lot sold on a single date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SaleEvent {
    pub id: String,
    /// Sale date (YYYY-MM-DD)
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    #[schemars(with = "Option<String>")]
    pub sale_date: Option<NaiveDate>,
    #[schemars(with = "f64")]
    pub quantity: Decimal,
    #[schemars(with = "f64")]
    pub sale_price_per_unit: Decimal,
    /// Id of the vesting lot the units came from
    pub vesting_id: String,
    /// Overrides the holding period derived from the vest and sale dates
    #[serde(default)]
    pub held_over_12_months: Option<bool>,
    #[serde(default)]
    pub description: Option<String>,
}

impl SaleEvent {
    pub fn proceeds(&self) -> Decimal {
        self.quantity * self.sale_price_per_unit
    }

    pub fn year_label(&self) -> YearLabel {
        year::resolve(self.sale_date)
    }

    /// Explicit flag if given, otherwise derived from the lot's vest date.
    /// Without both dates the holding cannot be shown to be long term.
    pub fn held_over_12_months(&self, vest: &VestingEvent) -> bool {
        self.held_over_12_months.unwrap_or_else(|| {
            match (vest.vest_date, self.sale_date) {
                (Some(acquired), Some(disposed)) => year::is_long_term_holding(acquired, disposed),
                _ => false,
            }
        })
    }
}

/// Taxpayer circumstances that change the assessment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct TaxProfile {
    /// Compulsory HECS/HELP repayments apply
    pub has_help_debt: bool,
    /// Appropriate private hospital cover held (no Medicare levy surcharge)
    pub has_private_hospital_cover: bool,
    /// Net capital losses carried into the first year
    #[schemars(with = "f64")]
    pub opening_capital_losses: Decimal,
    /// Rate withheld from vesting income by the employer, as a fraction
    #[schemars(with = "Option<f64>")]
    pub withholding_rate: Option<Decimal>,
}

/// Sale planning request for the optimizer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SalePlan {
    /// Dates on which a sale could be made
    pub candidate_dates: Vec<NaiveDate>,
    pub lots: Vec<PlannedLot>,
}

/// An unsold holding to include in planning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PlannedLot {
    pub vesting_id: String,
    /// Units to plan for (defaults to the lot's unsold balance)
    #[serde(default)]
    #[schemars(with = "Option<f64>")]
    pub quantity: Option<Decimal>,
    /// Assumed sale price per unit
    #[schemars(with = "f64")]
    pub expected_price: Decimal,
}

/// Vested, sold and remaining units of a lot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LotBalance {
    pub vested: Decimal,
    pub sold: Decimal,
}

impl LotBalance {
    /// Negative when sales exceed the vested quantity
    pub fn remaining(&self) -> Decimal {
        self.vested - self.sold
    }
}

/// Balance per vesting id. Sales referencing unknown lots are not included,
/// and only the first record of a repeated id counts as vested.
pub fn lot_balances(vesting: &[VestingEvent], sales: &[SaleEvent]) -> BTreeMap<String, LotBalance> {
    let mut balances: BTreeMap<String, LotBalance> = BTreeMap::new();
    for v in vesting {
        balances.entry(v.id.clone()).or_insert(LotBalance {
            vested: v.quantity,
            sold: Decimal::ZERO,
        });
    }
    for s in sales {
        if let Some(balance) = balances.get_mut(&s.vesting_id) {
            balance.sold += s.quantity;
        }
    }
    balances
}

/// Read the input document from JSON
pub fn read_input_json<R: Read>(reader: R) -> anyhow::Result<TaxInput> {
    let input: TaxInput = serde_json::from_reader(reader)?;
    Ok(input)
}

/// Parse a date that may be date-only or a datetime; anything else is treated as missing
fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.date());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    log::warn!("Unparseable date '{}' treated as missing", s);
    None
}

fn deserialize_optional_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    Ok(s.as_deref().and_then(parse_date))
}
