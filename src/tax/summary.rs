//! Year aggregation: bucket records by financial year and assess each year

use super::cgt::{self, LotGain, NetCapitalGain};
use super::income::{self, TaxAssessment};
use super::rates::RateTables;
use super::warnings::Warning;
use super::year::{FinancialYear, YearLabel};
use crate::events::{self, LotBalance, SaleEvent, TaxProfile, VestingEvent};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Totals and tax assessment for one financial year
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearSummary {
    pub year: FinancialYear,
    pub vesting_count: usize,
    pub sale_count: usize,
    /// Gross value of units vested in the year
    pub ordinary_income: Decimal,
    pub other_income: Decimal,
    pub capital_gains: NetCapitalGain,
    pub taxable_income: Decimal,
    /// Absent when the year has no rate table
    pub assessment: Option<TaxAssessment>,
    pub total_tax: Option<Decimal>,
    pub sale_proceeds: Decimal,
    /// Ordinary and other income plus raw capital gain, less total tax
    pub net_after_tax_value: Option<Decimal>,
    /// Estimated withholding on vesting income
    pub tax_withheld: Decimal,
    pub remaining_tax_payable: Option<Decimal>,
    pub lot_gains: Vec<LotGain>,
}

/// An amount reported at a numbered item of the individual tax return
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AtoItem {
    pub code: &'static str,
    pub label: &'static str,
    pub amount: Decimal,
}

impl YearSummary {
    /// Raw capital gain for the year (gains less current-year losses)
    pub fn gross_capital_gain(&self) -> Decimal {
        self.capital_gains.total_raw_gain()
    }

    pub fn net_capital_gain(&self) -> Decimal {
        self.capital_gains.net_gain
    }

    /// Tax return items this year's figures belong to
    pub fn ato_items(&self) -> Vec<AtoItem> {
        vec![
            AtoItem {
                code: "1-Salary",
                label: "Salary or wages",
                amount: self.ordinary_income,
            },
            AtoItem {
                code: "18-CapitalGains",
                label: "Net capital gain",
                amount: self.capital_gains.net_gain,
            },
        ]
    }
}

/// Change between two consecutive summarised years
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearComparison {
    pub from: FinancialYear,
    pub to: FinancialYear,
    pub taxable_income_change: Decimal,
    pub total_tax_change: Option<Decimal>,
    pub net_value_change: Option<Decimal>,
}

/// Summaries for every year present in the input
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct YearReport {
    pub years: BTreeMap<FinancialYear, YearSummary>,
    pub comparison: Vec<YearComparison>,
    pub lots: BTreeMap<String, LotBalance>,
    pub warnings: Vec<Warning>,
}

impl YearReport {
    pub fn year(&self, year: FinancialYear) -> Option<&YearSummary> {
        self.years.get(&year)
    }

    pub fn total_tax(&self) -> Decimal {
        self.years.values().filter_map(|y| y.total_tax).sum()
    }

    pub fn total_sale_proceeds(&self) -> Decimal {
        self.years.values().map(|y| y.sale_proceeds).sum()
    }

    /// Remaining units per lot, negative where a lot is oversold
    pub fn remaining_quantity(&self, vesting_id: &str) -> Option<Decimal> {
        self.lots.get(vesting_id).map(LotBalance::remaining)
    }
}

#[derive(Debug, Clone, Default)]
struct YearBucket {
    vesting_count: usize,
    ordinary_income: Decimal,
    other_income: Decimal,
    sale_proceeds: Decimal,
    lot_gains: Vec<LotGain>,
}

/// Accumulates records into year buckets, then assesses each year in order
#[derive(Debug, Clone)]
pub struct YearAggregator<'a> {
    rates: &'a RateTables,
    profile: &'a TaxProfile,
    buckets: BTreeMap<FinancialYear, YearBucket>,
    warnings: Vec<Warning>,
}

impl<'a> YearAggregator<'a> {
    pub fn new(rates: &'a RateTables, profile: &'a TaxProfile) -> Self {
        YearAggregator {
            rates,
            profile,
            buckets: BTreeMap::new(),
            warnings: Vec::new(),
        }
    }

    fn unresolved(&mut self, record: String) {
        log::warn!("{} has no usable date", record);
        self.warnings.push(Warning::UnresolvableDate { record });
    }

    pub fn add_vesting(&mut self, vest: &VestingEvent) {
        match vest.year_label() {
            YearLabel::Resolved(year) => {
                let bucket = self.buckets.entry(year).or_default();
                bucket.vesting_count += 1;
                bucket.ordinary_income += vest.gross_value();
            }
            YearLabel::Unresolved => self.unresolved(format!("vesting {}", vest.id)),
        }
    }

    /// Add a sale of units from `vest`, which supplies the cost base
    pub fn add_sale(&mut self, sale: &SaleEvent, vest: &VestingEvent) {
        match sale.year_label() {
            YearLabel::Resolved(year) => {
                let lot_gain = cgt::gain(sale, vest);
                let bucket = self.buckets.entry(year).or_default();
                bucket.sale_proceeds += lot_gain.proceeds;
                bucket.lot_gains.push(lot_gain);
            }
            YearLabel::Unresolved => self.unresolved(format!("sale {}", sale.id)),
        }
    }

    pub fn add_other_income(&mut self, year: FinancialYear, amount: Decimal) {
        self.buckets.entry(year).or_default().other_income += amount;
    }

    /// Assess every bucketed year, carrying capital losses forward in year order
    pub fn finish(self) -> YearReport {
        let YearAggregator {
            rates,
            profile,
            buckets,
            mut warnings,
        } = self;

        let withholding_rate = profile.withholding_rate.unwrap_or(Decimal::ZERO);
        let mut carried = profile.opening_capital_losses.max(Decimal::ZERO);
        let mut years = BTreeMap::new();

        for (year, bucket) in buckets {
            let capital_gains = cgt::net_capital_gain(&bucket.lot_gains, carried);
            carried = capital_gains.carried_forward;

            let taxable_income =
                bucket.ordinary_income + capital_gains.net_gain + bucket.other_income;

            let assessment = match rates.get(year) {
                Ok(table) => Some(income::assess(taxable_income, table, profile)),
                Err(e) => {
                    log::debug!("{}", e);
                    warnings.push(Warning::MissingReferenceData { year });
                    None
                }
            };
            let total_tax = assessment.as_ref().map(TaxAssessment::total);
            let tax_withheld = bucket.ordinary_income.max(Decimal::ZERO) * withholding_rate;
            let income_and_gains =
                bucket.ordinary_income + bucket.other_income + capital_gains.total_raw_gain();

            log::debug!(
                "{}: ordinary={}, other={}, net_cg={}, taxable={}, tax={:?}",
                year,
                bucket.ordinary_income,
                bucket.other_income,
                capital_gains.net_gain,
                taxable_income,
                total_tax
            );

            let summary = YearSummary {
                year,
                vesting_count: bucket.vesting_count,
                sale_count: bucket.lot_gains.len(),
                ordinary_income: bucket.ordinary_income,
                other_income: bucket.other_income,
                capital_gains,
                taxable_income,
                assessment,
                total_tax,
                sale_proceeds: bucket.sale_proceeds,
                net_after_tax_value: total_tax.map(|tax| income_and_gains - tax),
                tax_withheld,
                remaining_tax_payable: total_tax.map(|tax| tax - tax_withheld),
                lot_gains: bucket.lot_gains,
            };
            years.insert(year, summary);
        }

        let comparison = compare_years(&years);
        YearReport {
            years,
            comparison,
            lots: BTreeMap::new(),
            warnings,
        }
    }
}

/// Year-over-year deltas between consecutive summarised years
fn compare_years(years: &BTreeMap<FinancialYear, YearSummary>) -> Vec<YearComparison> {
    let ordered: Vec<&YearSummary> = years.values().collect();
    ordered
        .windows(2)
        .map(|pair| {
            let (prev, next) = (pair[0], pair[1]);
            YearComparison {
                from: prev.year,
                to: next.year,
                taxable_income_change: next.taxable_income - prev.taxable_income,
                total_tax_change: next.total_tax.zip(prev.total_tax).map(|(n, p)| n - p),
                net_value_change: next
                    .net_after_tax_value
                    .zip(prev.net_after_tax_value)
                    .map(|(n, p)| n - p),
            }
        })
        .collect()
}

/// Negative quantities, prices and amounts. They are computed as given.
pub fn input_warnings(
    vesting: &[VestingEvent],
    sales: &[SaleEvent],
    other_income: &BTreeMap<FinancialYear, Decimal>,
    profile: &TaxProfile,
) -> Vec<Warning> {
    let mut warnings = Vec::new();
    let mut negative = |record: String, field: &str| {
        log::warn!("{} has a negative {}", record, field);
        warnings.push(Warning::NegativeInput {
            record,
            field: field.to_string(),
        });
    };

    for v in vesting {
        if v.quantity < Decimal::ZERO {
            negative(format!("vesting {}", v.id), "quantity");
        }
        if v.fmv_per_unit < Decimal::ZERO {
            negative(format!("vesting {}", v.id), "fmv_per_unit");
        }
    }
    for s in sales {
        if s.quantity < Decimal::ZERO {
            negative(format!("sale {}", s.id), "quantity");
        }
        if s.sale_price_per_unit < Decimal::ZERO {
            negative(format!("sale {}", s.id), "sale_price_per_unit");
        }
    }
    for (year, amount) in other_income {
        if *amount < Decimal::ZERO {
            negative(format!("other income {}", year), "amount");
        }
    }
    if profile.opening_capital_losses < Decimal::ZERO {
        negative("profile".to_string(), "opening_capital_losses");
    }
    if profile.withholding_rate.is_some_and(|r| r < Decimal::ZERO) {
        negative("profile".to_string(), "withholding_rate");
    }
    warnings
}

/// Lots whose sales exceed the quantity vested
pub fn lot_warnings(lots: &BTreeMap<String, LotBalance>) -> Vec<Warning> {
    lots.iter()
        .filter(|(_, balance)| balance.sold > Decimal::ZERO && balance.remaining() < Decimal::ZERO)
        .map(|(vesting_id, balance)| {
            log::warn!(
                "Lot {} oversold: vested {}, sold {}",
                vesting_id,
                balance.vested,
                balance.sold
            );
            Warning::InconsistentLot {
                vesting_id: vesting_id.clone(),
                vested: balance.vested,
                sold: balance.sold,
                remaining: balance.remaining(),
            }
        })
        .collect()
}

/// Vesting ids used by more than one record
pub fn duplicate_lot_warnings(vesting: &[VestingEvent]) -> Vec<Warning> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for v in vesting {
        *counts.entry(v.id.as_str()).or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|(_, records)| *records > 1)
        .map(|(vesting_id, records)| {
            log::warn!("Vesting id {} used by {} records", vesting_id, records);
            Warning::DuplicateLot {
                vesting_id: vesting_id.to_string(),
                records,
            }
        })
        .collect()
}

/// Index vesting records by id; the first record wins for a repeated id
pub(crate) fn index_vesting(vesting: &[VestingEvent]) -> HashMap<&str, &VestingEvent> {
    let mut index = HashMap::new();
    for v in vesting {
        index.entry(v.id.as_str()).or_insert(v);
    }
    index
}

/// Aggregator loaded with the records, plus warnings about the records themselves
pub fn load<'a>(
    vesting: &[VestingEvent],
    sales: &[SaleEvent],
    rates: &'a RateTables,
    other_income: &BTreeMap<FinancialYear, Decimal>,
    profile: &'a TaxProfile,
) -> (YearAggregator<'a>, Vec<Warning>) {
    let mut warnings = input_warnings(vesting, sales, other_income, profile);
    warnings.extend(duplicate_lot_warnings(vesting));
    let index = index_vesting(vesting);

    let mut aggregator = YearAggregator::new(rates, profile);
    for v in vesting {
        aggregator.add_vesting(v);
    }
    for s in sales {
        match index.get(s.vesting_id.as_str()) {
            Some(vest) => aggregator.add_sale(s, vest),
            None => {
                log::warn!("Sale {} references unknown lot {}", s.id, s.vesting_id);
                warnings.push(Warning::UnknownLot {
                    record: format!("sale {}", s.id),
                    vesting_id: s.vesting_id.clone(),
                });
            }
        }
    }
    for (year, amount) in other_income {
        aggregator.add_other_income(*year, *amount);
    }
    warnings.extend(lot_warnings(&events::lot_balances(vesting, sales)));
    (aggregator, warnings)
}

/// Group vesting, sales and other income by financial year and assess each year
pub fn summarize(
    vesting: &[VestingEvent],
    sales: &[SaleEvent],
    rates: &RateTables,
    other_income: &BTreeMap<FinancialYear, Decimal>,
    profile: &TaxProfile,
) -> YearReport {
    let (aggregator, mut warnings) = load(vesting, sales, rates, other_income, profile);

    let mut report = aggregator.finish();
    for w in &report.warnings {
        if let Warning::MissingReferenceData { .. } = w {
            log::warn!("{}", w);
        }
    }
    warnings.append(&mut report.warnings);
    report.warnings = warnings;
    report.lots = events::lot_balances(vesting, sales);

    log::info!(
        "Summarised {} financial years, total tax {}, {} warnings",
        report.years.len(),
        report.total_tax(),
        report.warnings.len()
    );
    report
}
