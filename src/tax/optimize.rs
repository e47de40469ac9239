//! Sale timing advisor
//!
//! Enumerates allocations of open lots to candidate sale dates, evaluates each one
//! through the year aggregator and ranks them by after-tax value.

use super::rates::{RateTables, Schedule, TaxYearRateTable};
use super::summary::{self, YearAggregator, YearSummary};
use super::warnings::Warning;
use super::year::FinancialYear;
use crate::events::{self, SaleEvent, SalePlan, TaxProfile, VestingEvent};
use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// An unsold holding available for planning
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenLot {
    pub vesting_id: String,
    pub vest_date: Option<NaiveDate>,
    /// Cost base per unit (FMV at vesting)
    pub cost_base: Decimal,
    pub quantity: Decimal,
    pub expected_price: Decimal,
}

impl OpenLot {
    fn as_vesting(&self) -> VestingEvent {
        VestingEvent {
            id: self.vesting_id.clone(),
            vest_date: self.vest_date,
            quantity: self.quantity,
            fmv_per_unit: self.cost_base,
            description: None,
        }
    }

    /// First sale date on which the holding is more than 12 months old
    pub fn first_discount_date(&self) -> Option<NaiveDate> {
        self.vest_date
            .and_then(|d| d.checked_add_days(Days::new(366)))
    }

    /// Days from `as_of` until a sale would qualify for the discount (zero once it does)
    pub fn days_until_discount(&self, as_of: NaiveDate) -> Option<i64> {
        self.first_discount_date()
            .map(|d| (d - as_of).num_days().max(0))
    }

    fn is_sellable_on(&self, date: NaiveDate) -> bool {
        self.vest_date.map_or(true, |vested| date >= vested)
    }
}

/// Advisor tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdvisorConfig {
    /// Flag taxable income within this percentage above a threshold
    pub proximity_pct: Decimal,
    /// Equal parts each lot is split into; each part goes to one date
    pub tranches: u32,
    /// Above this many scenarios only whole-portfolio single-date sales are evaluated
    pub max_scenarios: usize,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        AdvisorConfig {
            proximity_pct: dec!(2),
            tranches: 1,
            max_scenarios: 20_000,
        }
    }
}

/// Existing records the planned sales are added to
#[derive(Debug, Clone, Copy)]
pub struct Portfolio<'a> {
    pub vesting: &'a [VestingEvent],
    pub sales: &'a [SaleEvent],
    pub other_income: &'a BTreeMap<FinancialYear, Decimal>,
    pub profile: &'a TaxProfile,
}

/// Units of a lot sold on one date in a scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaleAllocation {
    pub vesting_id: String,
    pub sale_date: NaiveDate,
    pub quantity: Decimal,
    pub expected_price: Decimal,
    pub held_over_12_months: bool,
}

/// Taxable income sitting just above a threshold
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThresholdProximity {
    pub year: FinancialYear,
    pub schedule: Schedule,
    pub threshold: Decimal,
    pub taxable_income: Decimal,
    /// Amount by which income exceeds the threshold
    pub margin: Decimal,
}

/// One evaluated allocation of lots to dates
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioOutcome {
    pub rank: usize,
    pub scenario: usize,
    pub is_baseline: bool,
    pub allocations: Vec<SaleAllocation>,
    /// Summaries of the years candidate dates fall in
    pub years: BTreeMap<FinancialYear, YearSummary>,
    /// Sale proceeds less total tax over those years
    pub after_tax_value: Decimal,
    pub sale_proceeds: Decimal,
    pub total_tax: Decimal,
    pub claimed_discount: Decimal,
    pub first_discounted_sale: Option<NaiveDate>,
    pub threshold_proximity: Vec<ThresholdProximity>,
}

impl ScenarioOutcome {
    pub fn is_threshold_sensitive(&self) -> bool {
        !self.threshold_proximity.is_empty()
    }
}

/// Discount timing for a planned lot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LotTiming {
    pub vesting_id: String,
    pub quantity: Decimal,
    pub vest_date: Option<NaiveDate>,
    pub first_discount_date: Option<NaiveDate>,
    /// As of the earliest candidate date
    pub days_until_discount: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Recommendation {
    /// All evaluated scenarios, best first
    pub ranked: Vec<ScenarioOutcome>,
    /// Every lot sold on its earliest candidate date
    pub baseline: Option<ScenarioOutcome>,
    pub lots: Vec<LotTiming>,
    /// False when the scenario cap forced single-date scenarios only
    pub exhaustive: bool,
    pub warnings: Vec<Warning>,
}

impl Recommendation {
    pub fn best(&self) -> Option<&ScenarioOutcome> {
        self.ranked.first()
    }

    pub fn threshold_sensitive(&self) -> impl Iterator<Item = &ScenarioOutcome> {
        self.ranked.iter().filter(|s| s.is_threshold_sensitive())
    }
}

/// Resolve planned lots against the vesting records. Quantity defaults to the
/// lot's unsold balance; lots with nothing left are skipped. Planning more than
/// the unsold balance is allowed but flagged.
pub fn open_lots(
    plan: &SalePlan,
    vesting: &[VestingEvent],
    sales: &[SaleEvent],
) -> (Vec<OpenLot>, Vec<Warning>) {
    let index = summary::index_vesting(vesting);
    let balances = events::lot_balances(vesting, sales);
    let mut lots = Vec::new();
    let mut warnings = Vec::new();

    for planned in &plan.lots {
        let Some(vest) = index.get(planned.vesting_id.as_str()) else {
            log::warn!("Planned lot {} not found in vesting records", planned.vesting_id);
            warnings.push(Warning::UnknownLot {
                record: format!("plan {}", planned.vesting_id),
                vesting_id: planned.vesting_id.clone(),
            });
            continue;
        };
        let balance = balances
            .get(&planned.vesting_id)
            .copied()
            .unwrap_or_default();
        let quantity = planned.quantity.unwrap_or_else(|| balance.remaining());
        if planned.quantity.is_some_and(|q| q < Decimal::ZERO) {
            log::warn!("Planned lot {} has a negative quantity", planned.vesting_id);
            warnings.push(Warning::NegativeInput {
                record: format!("plan {}", planned.vesting_id),
                field: "quantity".to_string(),
            });
        }
        if quantity <= Decimal::ZERO {
            log::warn!("Lot {} has no units left to plan", planned.vesting_id);
            continue;
        }
        if quantity > balance.remaining() {
            let sold = balance.sold + quantity;
            log::warn!(
                "Planned lot {} sells {} of {} vested units",
                planned.vesting_id,
                sold,
                balance.vested
            );
            warnings.push(Warning::InconsistentLot {
                vesting_id: planned.vesting_id.clone(),
                vested: balance.vested,
                sold,
                remaining: balance.vested - sold,
            });
        }
        if planned.expected_price < Decimal::ZERO {
            warnings.push(Warning::NegativeInput {
                record: format!("plan {}", planned.vesting_id),
                field: "expected_price".to_string(),
            });
        }
        lots.push(OpenLot {
            vesting_id: planned.vesting_id.clone(),
            vest_date: vest.vest_date,
            cost_base: vest.fmv_per_unit,
            quantity,
            expected_price: planned.expected_price,
        });
    }
    (lots, warnings)
}

/// A lot's share of a scenario: (date index, quantity) pairs
type LotOption = Vec<(usize, Decimal)>;

/// Ways to place `tranches` equal parts on `dates` dates, saturating at `usize::MAX`
fn option_count(dates: usize, tranches: u32) -> usize {
    if dates == 0 {
        return 0;
    }
    let parts = u128::from(tranches.max(1));
    let n = dates as u128 + parts - 1;
    let k = parts.min(n - parts);
    let mut count: u128 = 1;
    for i in 1..=k {
        count = match count.checked_mul(n - k + i) {
            Some(c) => c / i,
            None => return usize::MAX,
        };
    }
    usize::try_from(count).unwrap_or(usize::MAX)
}

/// Every way to split the lot into `tranches` equal parts over the eligible dates,
/// ignoring part order. The latest date used takes any rounding remainder.
fn lot_options(eligible: &[usize], quantity: Decimal, tranches: u32) -> Vec<LotOption> {
    fn assign(
        eligible: &[usize],
        left: u32,
        current: &mut Vec<(usize, u32)>,
        out: &mut Vec<Vec<(usize, u32)>>,
    ) {
        match eligible {
            [] => {}
            [last] => {
                current.push((*last, left));
                out.push(current.clone());
                current.pop();
            }
            [date, rest @ ..] => {
                for take in (0..=left).rev() {
                    current.push((*date, take));
                    assign(rest, left - take, current, out);
                    current.pop();
                }
            }
        }
    }

    let parts = tranches.max(1);
    let part = (quantity / Decimal::from(parts)).round_dp(8);
    let mut counts = Vec::new();
    assign(eligible, parts, &mut Vec::new(), &mut counts);

    counts
        .into_iter()
        .map(|option| {
            let used: Vec<(usize, u32)> = option.into_iter().filter(|(_, c)| *c > 0).collect();
            let mut allocated = Decimal::ZERO;
            let mut split = Vec::with_capacity(used.len());
            for (i, (date, count)) in used.iter().enumerate() {
                let qty = if i + 1 == used.len() {
                    quantity - allocated
                } else {
                    part * Decimal::from(*count)
                };
                allocated += qty;
                split.push((*date, qty));
            }
            split
        })
        .collect()
}

/// Cartesian product of per-lot options
fn cartesian(options: &[Vec<LotOption>]) -> Vec<Vec<LotOption>> {
    options.iter().fold(vec![Vec::new()], |acc, lot_options| {
        acc.iter()
            .flat_map(|prefix| {
                lot_options.iter().map(move |option| {
                    let mut next = prefix.clone();
                    next.push(option.clone());
                    next
                })
            })
            .collect()
    })
}

/// Each lot sold whole on the first eligible date on or after each candidate date
fn single_date_scenarios(
    eligible: &[Vec<usize>],
    dates: usize,
    quantities: &[Decimal],
) -> Vec<Vec<LotOption>> {
    let mut seen = BTreeSet::new();
    let mut scenarios = Vec::new();
    for d in 0..dates {
        let scenario: Vec<LotOption> = eligible
            .iter()
            .zip(quantities)
            .map(|(dates, qty)| {
                let date = dates
                    .iter()
                    .copied()
                    .find(|e| *e >= d)
                    .or_else(|| dates.last().copied())
                    .unwrap_or(d);
                vec![(date, *qty)]
            })
            .collect();
        if seen.insert(scenario.clone()) {
            scenarios.push(scenario);
        }
    }
    scenarios
}

/// Thresholds the year's taxable income exceeds by no more than `proximity_pct` percent
fn threshold_proximity(
    summary: &YearSummary,
    table: &TaxYearRateTable,
    profile: &TaxProfile,
    proximity_pct: Decimal,
) -> Vec<ThresholdProximity> {
    let income = summary.taxable_income;
    table
        .boundaries()
        .filter(|(schedule, _)| match schedule {
            Schedule::IncomeTax => true,
            Schedule::MedicareSurcharge => !profile.has_private_hospital_cover,
            Schedule::HelpRepayment => profile.has_help_debt,
        })
        .filter_map(|(schedule, threshold)| {
            let margin = income - threshold;
            let window = threshold * proximity_pct / dec!(100);
            (margin > Decimal::ZERO && margin <= window).then(|| ThresholdProximity {
                year: summary.year,
                schedule,
                threshold,
                taxable_income: income,
                margin,
            })
        })
        .collect()
}

struct Evaluator<'a> {
    base: YearAggregator<'a>,
    lots: &'a [OpenLot],
    vestings: Vec<VestingEvent>,
    dates: &'a [NaiveDate],
    affected: BTreeSet<FinancialYear>,
    rates: &'a RateTables,
    profile: &'a TaxProfile,
    config: &'a AdvisorConfig,
}

impl Evaluator<'_> {
    fn evaluate(&self, scenario: usize, options: &[LotOption]) -> ScenarioOutcome {
        let mut aggregator = self.base.clone();
        let mut allocations = Vec::new();
        let mut first_discounted_sale: Option<NaiveDate> = None;

        for ((lot, vest), option) in self.lots.iter().zip(&self.vestings).zip(options) {
            for (date_index, quantity) in option {
                let sale_date = self.dates[*date_index];
                let sale = SaleEvent {
                    id: format!("plan {} {}", lot.vesting_id, sale_date),
                    sale_date: Some(sale_date),
                    quantity: *quantity,
                    sale_price_per_unit: lot.expected_price,
                    vesting_id: lot.vesting_id.clone(),
                    held_over_12_months: None,
                    description: None,
                };
                let held_over_12_months = sale.held_over_12_months(vest);
                if held_over_12_months && lot.expected_price > lot.cost_base {
                    first_discounted_sale = Some(
                        first_discounted_sale.map_or(sale_date, |d| d.min(sale_date)),
                    );
                }
                aggregator.add_sale(&sale, vest);
                allocations.push(SaleAllocation {
                    vesting_id: lot.vesting_id.clone(),
                    sale_date,
                    quantity: *quantity,
                    expected_price: lot.expected_price,
                    held_over_12_months,
                });
            }
        }

        let mut report = aggregator.finish();
        let mut years = BTreeMap::new();
        let mut sale_proceeds = Decimal::ZERO;
        let mut total_tax = Decimal::ZERO;
        let mut claimed_discount = Decimal::ZERO;
        let mut proximity = Vec::new();

        for year in &self.affected {
            let Some(summary) = report.years.remove(year) else {
                continue;
            };
            sale_proceeds += summary.sale_proceeds;
            total_tax += summary.total_tax.unwrap_or(Decimal::ZERO);
            claimed_discount += summary.capital_gains.discount;
            if let Ok(table) = self.rates.get(*year) {
                proximity.extend(threshold_proximity(
                    &summary,
                    table,
                    self.profile,
                    self.config.proximity_pct,
                ));
            }
            years.insert(*year, summary);
        }

        let after_tax_value = sale_proceeds - total_tax;
        log::debug!(
            "Scenario {}: proceeds={}, tax={}, after_tax={}, discount={}",
            scenario,
            sale_proceeds,
            total_tax,
            after_tax_value,
            claimed_discount
        );

        ScenarioOutcome {
            rank: 0,
            scenario,
            is_baseline: false,
            allocations,
            years,
            after_tax_value,
            sale_proceeds,
            total_tax,
            claimed_discount,
            first_discounted_sale,
            threshold_proximity: proximity,
        }
    }
}

/// Best first by after-tax value. Ties go to the larger claimed discount, and only
/// then to the earliest sale of a discount-eligible gain, so a scenario that realises
/// discounted gains early never beats one that claims more discount for the same value.
/// The scenario index settles anything left.
fn compare_outcomes(a: &ScenarioOutcome, b: &ScenarioOutcome) -> Ordering {
    b.after_tax_value
        .cmp(&a.after_tax_value)
        .then_with(|| b.claimed_discount.cmp(&a.claimed_discount))
        .then_with(|| match (a.first_discounted_sale, b.first_discounted_sale) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.scenario.cmp(&b.scenario))
}

/// Rank sale timings for the open lots across the candidate dates
pub fn recommend(
    open_lots: &[OpenLot],
    candidate_dates: &[NaiveDate],
    portfolio: Portfolio<'_>,
    rates: &RateTables,
    config: &AdvisorConfig,
) -> Recommendation {
    let dates: Vec<NaiveDate> = candidate_dates
        .iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let (base, mut warnings) = summary::load(
        portfolio.vesting,
        portfolio.sales,
        rates,
        portfolio.other_income,
        portfolio.profile,
    );
    warnings.extend(base.clone().finish().warnings);

    let Some(earliest) = dates.first().copied() else {
        log::warn!("No candidate sale dates given");
        return Recommendation {
            exhaustive: true,
            warnings,
            ..Recommendation::default()
        };
    };

    let mut lots = Vec::new();
    let mut eligible = Vec::new();
    for lot in open_lots {
        let sellable: Vec<usize> = (0..dates.len())
            .filter(|i| lot.is_sellable_on(dates[*i]))
            .collect();
        if sellable.is_empty() {
            log::warn!("Lot {} vests after every candidate date", lot.vesting_id);
            continue;
        }
        lots.push(lot.clone());
        eligible.push(sellable);
    }

    if lots.is_empty() {
        log::warn!("No open lots to plan");
        return Recommendation {
            exhaustive: true,
            warnings,
            ..Recommendation::default()
        };
    }

    let timings = lots
        .iter()
        .map(|lot| LotTiming {
            vesting_id: lot.vesting_id.clone(),
            quantity: lot.quantity,
            vest_date: lot.vest_date,
            first_discount_date: lot.first_discount_date(),
            days_until_discount: lot.days_until_discount(earliest),
        })
        .collect();

    let affected: BTreeSet<FinancialYear> =
        dates.iter().map(|d| FinancialYear::from_date(*d)).collect();
    for year in &affected {
        let warning = Warning::MissingReferenceData { year: *year };
        if rates.get(*year).is_err() && !warnings.contains(&warning) {
            log::warn!("{}", warning);
            warnings.push(warning);
        }
    }

    let count = eligible.iter().fold(1usize, |acc, sellable| {
        acc.saturating_mul(option_count(sellable.len(), config.tranches))
    });
    let exhaustive = count <= config.max_scenarios;
    let scenarios = if exhaustive {
        let options: Vec<Vec<LotOption>> = lots
            .iter()
            .zip(&eligible)
            .map(|(lot, sellable)| lot_options(sellable, lot.quantity, config.tranches))
            .collect();
        cartesian(&options)
    } else {
        log::warn!(
            "{} scenarios exceed the cap of {}, evaluating single-date sales only",
            count,
            config.max_scenarios
        );
        let quantities: Vec<Decimal> = lots.iter().map(|l| l.quantity).collect();
        single_date_scenarios(&eligible, dates.len(), &quantities)
    };

    let baseline_key: Vec<LotOption> = lots
        .iter()
        .zip(&eligible)
        .map(|(lot, sellable)| vec![(sellable[0], lot.quantity)])
        .collect();

    let vestings = lots.iter().map(OpenLot::as_vesting).collect();
    let evaluator = Evaluator {
        base,
        lots: &lots,
        vestings,
        dates: &dates,
        affected,
        rates,
        profile: portfolio.profile,
        config,
    };

    let mut ranked: Vec<ScenarioOutcome> = scenarios
        .iter()
        .enumerate()
        .map(|(i, options)| {
            let mut outcome = evaluator.evaluate(i, options);
            outcome.is_baseline = *options == baseline_key;
            outcome
        })
        .collect();
    ranked.sort_by(compare_outcomes);
    for (i, outcome) in ranked.iter_mut().enumerate() {
        outcome.rank = i + 1;
    }
    let baseline = ranked.iter().find(|s| s.is_baseline).cloned();

    log::info!(
        "Evaluated {} scenarios for {} lots over {} dates",
        ranked.len(),
        lots.len(),
        dates.len()
    );

    Recommendation {
        ranked,
        baseline,
        lots: timings,
        exhaustive,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tax::year::is_long_term_holding;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn vest(id: &str, vest_date: NaiveDate, qty: Decimal, fmv: Decimal) -> VestingEvent {
        VestingEvent {
            id: id.to_string(),
            vest_date: Some(vest_date),
            quantity: qty,
            fmv_per_unit: fmv,
            description: None,
        }
    }

    fn lot(v: &VestingEvent, price: Decimal) -> OpenLot {
        OpenLot {
            vesting_id: v.id.clone(),
            vest_date: v.vest_date,
            cost_base: v.fmv_per_unit,
            quantity: v.quantity,
            expected_price: price,
        }
    }

    fn covered() -> TaxProfile {
        TaxProfile {
            has_private_hospital_cover: true,
            ..TaxProfile::default()
        }
    }

    #[test]
    fn waiting_for_discount_wins() {
        let vesting = [vest("v1", date(2024, 3, 1), dec!(100), dec!(10))];
        let other = BTreeMap::from([(FinancialYear(2024), dec!(100000))]);
        let profile = covered();
        let portfolio = Portfolio {
            vesting: &vesting,
            sales: &[],
            other_income: &other,
            profile: &profile,
        };
        let rec = recommend(
            &[lot(&vesting[0], dec!(20))],
            &[date(2025, 2, 1), date(2025, 3, 5)],
            portfolio,
            &RateTables::australian(),
            &AdvisorConfig::default(),
        );
        assert_eq!(rec.ranked.len(), 2);
        let best = rec.best().unwrap();
        assert_eq!(best.allocations[0].sale_date, date(2025, 3, 5));
        assert!(best.allocations[0].held_over_12_months);
        assert_eq!(best.claimed_discount, dec!(500));
        assert_eq!(best.first_discounted_sale, Some(date(2025, 3, 5)));

        let baseline = rec.baseline.as_ref().unwrap();
        assert_eq!(baseline.allocations[0].sale_date, date(2025, 2, 1));
        assert_eq!(baseline.rank, 2);
        assert!(best.after_tax_value > baseline.after_tax_value);
        assert!(rec.exhaustive);
    }

    #[test]
    fn deferring_into_lower_income_year_wins() {
        let vesting = [vest("v1", date(2023, 1, 10), dec!(1000), dec!(10))];
        let other = BTreeMap::from([
            (FinancialYear(2023), dec!(170000)),
            (FinancialYear(2024), dec!(40000)),
        ]);
        let profile = covered();
        let portfolio = Portfolio {
            vesting: &vesting,
            sales: &[],
            other_income: &other,
            profile: &profile,
        };
        let rec = recommend(
            &[lot(&vesting[0], dec!(30))],
            &[date(2024, 6, 20), date(2024, 7, 5)],
            portfolio,
            &RateTables::australian(),
            &AdvisorConfig::default(),
        );
        let best = rec.best().unwrap();
        assert_eq!(best.allocations[0].sale_date, date(2024, 7, 5));
        assert_eq!(best.years.len(), 2);
        // both scenarios claim the same discount; only the year differs
        assert_eq!(best.claimed_discount, dec!(10000));
        assert!(rec.baseline.as_ref().unwrap().after_tax_value < best.after_tax_value);
    }

    #[test]
    fn tranches_enumerate_splits() {
        let vesting = [vest("v1", date(2024, 8, 1), dec!(100), dec!(10))];
        let other = BTreeMap::new();
        let profile = covered();
        let portfolio = Portfolio {
            vesting: &vesting,
            sales: &[],
            other_income: &other,
            profile: &profile,
        };
        let config = AdvisorConfig {
            tranches: 2,
            ..AdvisorConfig::default()
        };
        let rec = recommend(
            &[lot(&vesting[0], dec!(12))],
            &[date(2024, 9, 1), date(2025, 9, 1)],
            portfolio,
            &RateTables::australian(),
            &config,
        );
        assert_eq!(rec.ranked.len(), 3);
        assert!(rec
            .ranked
            .iter()
            .any(|s| s.allocations.len() == 2 && s.allocations[0].quantity == dec!(50)));
    }

    #[test]
    fn scenario_cap_falls_back_to_single_dates() {
        let vesting = [vest("v1", date(2024, 8, 1), dec!(100), dec!(10))];
        let other = BTreeMap::new();
        let profile = covered();
        let portfolio = Portfolio {
            vesting: &vesting,
            sales: &[],
            other_income: &other,
            profile: &profile,
        };
        let config = AdvisorConfig {
            tranches: 2,
            max_scenarios: 2,
            ..AdvisorConfig::default()
        };
        let rec = recommend(
            &[lot(&vesting[0], dec!(12))],
            &[date(2024, 9, 1), date(2025, 9, 1)],
            portfolio,
            &RateTables::australian(),
            &config,
        );
        assert!(!rec.exhaustive);
        assert_eq!(rec.ranked.len(), 2);
        assert!(rec.baseline.is_some());
    }

    #[test]
    fn dates_before_vesting_are_skipped() {
        let vesting = [vest("v1", date(2024, 8, 1), dec!(100), dec!(10))];
        let other = BTreeMap::new();
        let profile = covered();
        let portfolio = Portfolio {
            vesting: &vesting,
            sales: &[],
            other_income: &other,
            profile: &profile,
        };
        let rec = recommend(
            &[lot(&vesting[0], dec!(12))],
            &[date(2024, 7, 1), date(2024, 9, 1)],
            portfolio,
            &RateTables::australian(),
            &AdvisorConfig::default(),
        );
        assert_eq!(rec.ranked.len(), 1);
        assert_eq!(rec.ranked[0].allocations[0].sale_date, date(2024, 9, 1));
        assert!(rec.ranked[0].is_baseline);
    }

    #[test]
    fn income_just_over_threshold_is_flagged() {
        let vesting = [vest("v1", date(2024, 8, 1), dec!(100), dec!(10))];
        let other = BTreeMap::from([(FinancialYear(2024), dec!(118000))]);
        let profile = covered();
        let portfolio = Portfolio {
            vesting: &vesting,
            sales: &[],
            other_income: &other,
            profile: &profile,
        };
        let rec = recommend(
            &[lot(&vesting[0], dec!(40))],
            &[date(2024, 10, 1)],
            portfolio,
            &RateTables::australian(),
            &AdvisorConfig::default(),
        );
        let flagged: Vec<_> = rec.threshold_sensitive().collect();
        assert_eq!(flagged.len(), 1);
        assert_eq!(
            flagged[0].threshold_proximity,
            vec![ThresholdProximity {
                year: FinancialYear(2024),
                schedule: Schedule::IncomeTax,
                threshold: dec!(120000),
                taxable_income: dec!(122000),
                margin: dec!(2000),
            }]
        );
    }

    fn proximity_for(other_income: Decimal, profile: &TaxProfile) -> Vec<ThresholdProximity> {
        let vesting = [vest("v1", date(2024, 8, 1), dec!(100), dec!(10))];
        let other = BTreeMap::from([(FinancialYear(2024), other_income)]);
        let portfolio = Portfolio {
            vesting: &vesting,
            sales: &[],
            other_income: &other,
            profile,
        };
        let rec = recommend(
            &[lot(&vesting[0], dec!(40))],
            &[date(2024, 10, 1)],
            portfolio,
            &RateTables::australian(),
            &AdvisorConfig::default(),
        );
        rec.ranked
            .into_iter()
            .flat_map(|s| s.threshold_proximity)
            .collect()
    }

    #[test]
    fn help_threshold_flagged_only_with_help_debt() {
        let with_debt = TaxProfile {
            has_help_debt: true,
            ..covered()
        };
        // 1,000 vesting income and 3,000 short-term gain on top
        assert_eq!(
            proximity_for(dec!(50935), &with_debt),
            vec![ThresholdProximity {
                year: FinancialYear(2024),
                schedule: Schedule::HelpRepayment,
                threshold: dec!(54435),
                taxable_income: dec!(54935),
                margin: dec!(500),
            }]
        );
        assert!(proximity_for(dec!(50935), &covered()).is_empty());
    }

    #[test]
    fn surcharge_threshold_flagged_only_without_cover() {
        assert_eq!(
            proximity_for(dec!(93500), &TaxProfile::default()),
            vec![ThresholdProximity {
                year: FinancialYear(2024),
                schedule: Schedule::MedicareSurcharge,
                threshold: dec!(97000),
                taxable_income: dec!(97500),
                margin: dec!(500),
            }]
        );
        assert!(proximity_for(dec!(93500), &covered()).is_empty());
    }

    #[test]
    fn lot_timing_counts_days_to_discount() {
        let vesting = [vest("v1", date(2024, 8, 1), dec!(100), dec!(10))];
        let other = BTreeMap::new();
        let profile = covered();
        let portfolio = Portfolio {
            vesting: &vesting,
            sales: &[],
            other_income: &other,
            profile: &profile,
        };
        let rec = recommend(
            &[lot(&vesting[0], dec!(12))],
            &[date(2024, 9, 1)],
            portfolio,
            &RateTables::australian(),
            &AdvisorConfig::default(),
        );
        let timing = &rec.lots[0];
        assert_eq!(timing.first_discount_date, Some(date(2025, 8, 2)));
        assert_eq!(timing.days_until_discount, Some(335));
        assert!(is_long_term_holding(date(2024, 8, 1), date(2025, 8, 2)));
        assert!(!is_long_term_holding(date(2024, 8, 1), date(2025, 8, 1)));
    }

    #[test]
    fn unknown_year_is_warned_once() {
        let vesting = [vest("v1", date(2029, 8, 1), dec!(100), dec!(10))];
        let other = BTreeMap::new();
        let profile = covered();
        let portfolio = Portfolio {
            vesting: &vesting,
            sales: &[],
            other_income: &other,
            profile: &profile,
        };
        let rec = recommend(
            &[lot(&vesting[0], dec!(12))],
            &[date(2029, 9, 1)],
            portfolio,
            &RateTables::australian(),
            &AdvisorConfig::default(),
        );
        assert_eq!(
            rec.warnings,
            vec![Warning::MissingReferenceData {
                year: FinancialYear(2029)
            }]
        );
        assert_eq!(rec.ranked.len(), 1);
    }

    #[test]
    fn open_lots_default_to_remaining_balance() {
        let vesting = [vest("v1", date(2024, 8, 1), dec!(100), dec!(10))];
        let sales = [SaleEvent {
            id: "s1".to_string(),
            sale_date: Some(date(2024, 9, 1)),
            quantity: dec!(30),
            sale_price_per_unit: dec!(12),
            vesting_id: "v1".to_string(),
            held_over_12_months: None,
            description: None,
        }];
        let plan = SalePlan {
            candidate_dates: vec![date(2025, 9, 1)],
            lots: vec![
                events::PlannedLot {
                    vesting_id: "v1".to_string(),
                    quantity: None,
                    expected_price: dec!(15),
                },
                events::PlannedLot {
                    vesting_id: "missing".to_string(),
                    quantity: Some(dec!(10)),
                    expected_price: dec!(15),
                },
            ],
        };
        let (lots, warnings) = open_lots(&plan, &vesting, &sales);
        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0].quantity, dec!(70));
        assert_eq!(lots[0].cost_base, dec!(10));
        assert_eq!(
            warnings,
            vec![Warning::UnknownLot {
                record: "plan missing".to_string(),
                vesting_id: "missing".to_string()
            }]
        );

        let oversell = SalePlan {
            lots: vec![events::PlannedLot {
                vesting_id: "v1".to_string(),
                quantity: Some(dec!(500)),
                expected_price: dec!(15),
            }],
            ..plan.clone()
        };
        let (lots, warnings) = open_lots(&oversell, &vesting, &sales);
        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0].quantity, dec!(500));
        assert_eq!(
            warnings,
            vec![Warning::InconsistentLot {
                vesting_id: "v1".to_string(),
                vested: dec!(100),
                sold: dec!(530),
                remaining: dec!(-430),
            }]
        );

        let negative = SalePlan {
            lots: vec![events::PlannedLot {
                vesting_id: "v1".to_string(),
                quantity: Some(dec!(-5)),
                expected_price: dec!(15),
            }],
            ..plan
        };
        let (lots, warnings) = open_lots(&negative, &vesting, &sales);
        assert!(lots.is_empty());
        assert_eq!(
            warnings,
            vec![Warning::NegativeInput {
                record: "plan v1".to_string(),
                field: "quantity".to_string(),
            }]
        );
    }

    #[test]
    fn lot_options_split_the_whole_quantity() {
        let options = lot_options(&[0, 1, 2], dec!(100), 3);
        assert_eq!(options.len(), option_count(3, 3));
        assert_eq!(options[0], vec![(0, dec!(100))]);
        for option in &options {
            assert_eq!(option.iter().map(|(_, q)| *q).sum::<Decimal>(), dec!(100));
        }
        assert!(options.contains(&vec![
            (0, dec!(33.33333333)),
            (1, dec!(33.33333333)),
            (2, dec!(33.33333334))
        ]));
    }

    #[test]
    fn option_count_matches_enumeration() {
        for dates in 1..5 {
            for tranches in 1..5 {
                let eligible: Vec<usize> = (0..dates).collect();
                assert_eq!(
                    option_count(dates, tranches),
                    lot_options(&eligible, dec!(10), tranches).len()
                );
            }
        }
        assert_eq!(option_count(2, 2), 3);
        assert_eq!(option_count(1, u32::MAX), 1);
        assert_eq!(option_count(10, 30), 211_915_132);
        assert_eq!(option_count(500, u32::MAX), usize::MAX);
    }

    #[test]
    fn many_tranches_fall_back_without_enumerating() {
        let vesting = [vest("v1", date(2023, 8, 1), dec!(300), dec!(10))];
        let other = BTreeMap::new();
        let profile = covered();
        let portfolio = Portfolio {
            vesting: &vesting,
            sales: &[],
            other_income: &other,
            profile: &profile,
        };
        let dates: Vec<NaiveDate> = (1..=10).map(|m| date(2024, m, 15)).collect();
        let config = AdvisorConfig {
            tranches: 30,
            ..AdvisorConfig::default()
        };
        let rec = recommend(
            &[lot(&vesting[0], dec!(12))],
            &dates,
            portfolio,
            &RateTables::australian(),
            &config,
        );
        assert!(!rec.exhaustive);
        assert_eq!(rec.ranked.len(), 10);
        assert!(rec.baseline.is_some());
        assert!(rec.ranked.iter().all(|s| s.allocations.len() == 1));
    }

    mod properties {
        use super::*;
        use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

        proptest! {
            #![proptest_config(proptest::test_runner::Config::with_cases(48))]

            #[test]
            fn best_is_never_worse_than_baseline(
                salary_a in 0u32..250_000,
                salary_b in 0u32..250_000,
                price in 1u32..60,
                qty in 1u32..2_000,
                tranches in 1u32..3,
            ) {
                let vesting = [vest("v1", date(2023, 9, 1), Decimal::from(qty), dec!(20))];
                let other = BTreeMap::from([
                    (FinancialYear(2023), Decimal::from(salary_a)),
                    (FinancialYear(2024), Decimal::from(salary_b)),
                ]);
                let profile = TaxProfile {
                    has_help_debt: salary_a % 2 == 0,
                    ..TaxProfile::default()
                };
                let portfolio = Portfolio {
                    vesting: &vesting,
                    sales: &[],
                    other_income: &other,
                    profile: &profile,
                };
                let config = AdvisorConfig { tranches, ..AdvisorConfig::default() };
                let dates = [date(2024, 3, 1), date(2024, 6, 30), date(2024, 9, 5)];
                let rec = recommend(
                    &[lot(&vesting[0], Decimal::from(price))],
                    &dates,
                    portfolio,
                    &RateTables::australian(),
                    &config,
                );
                let best = rec.best().unwrap();
                let baseline = rec.baseline.as_ref().unwrap();
                prop_assert!(best.after_tax_value >= baseline.after_tax_value);

                let again = recommend(
                    &[lot(&vesting[0], Decimal::from(price))],
                    &dates,
                    portfolio,
                    &RateTables::australian(),
                    &config,
                );
                prop_assert_eq!(rec, again);
            }
        }
    }
}
