//! Progressive income tax, Medicare levy and HECS/HELP repayment

use super::rates::{Bracket, TaxYearRateTable};
use crate::events::TaxProfile;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Marginal income tax for a taxable income
///
/// Walks the ordered brackets, charging each bracket's rate on the slice of income
/// between its threshold and the next one. The top bracket is uncapped.
pub fn income_tax(taxable_income: Decimal, table: &TaxYearRateTable) -> Decimal {
    let income = taxable_income.max(Decimal::ZERO);
    let brackets = &table.income_tax;

    brackets
        .iter()
        .enumerate()
        .fold(Decimal::ZERO, |tax, (i, bracket)| {
            if income <= bracket.threshold {
                return tax;
            }
            let upper = brackets
                .get(i + 1)
                .map_or(income, |next| income.min(next.threshold));
            tax + (upper - bracket.threshold) * bracket.rate
        })
}

/// Rate that applies to the next dollar of income
pub fn marginal_rate(taxable_income: Decimal, table: &TaxYearRateTable) -> Decimal {
    let income = taxable_income.max(Decimal::ZERO);
    table
        .income_tax
        .iter()
        .rev()
        .find(|b| income > b.threshold)
        .map_or(Decimal::ZERO, |b| b.rate)
}

/// Medicare levy and surcharge payable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MedicareLevy {
    pub levy: Decimal,
    pub surcharge: Decimal,
    pub surcharge_rate: Decimal,
}

impl MedicareLevy {
    pub fn total(&self) -> Decimal {
        self.levy + self.surcharge
    }
}

/// Base levy on all taxable income, plus the surcharge tier the income exceeds.
/// The surcharge is charged on top of the levy, never instead of it.
pub fn medicare_levy(
    taxable_income: Decimal,
    table: &TaxYearRateTable,
    has_private_hospital_cover: bool,
) -> MedicareLevy {
    let income = taxable_income.max(Decimal::ZERO);
    let levy = income * table.medicare_levy_rate;

    let surcharge_rate = if has_private_hospital_cover {
        Decimal::ZERO
    } else {
        table
            .medicare_surcharge
            .iter()
            .rev()
            .find(|tier| income > tier.threshold)
            .map_or(Decimal::ZERO, |tier| tier.rate)
    };

    MedicareLevy {
        levy,
        surcharge: income * surcharge_rate,
        surcharge_rate,
    }
}

/// The HELP bracket containing an income (threshold inclusive)
fn help_bracket(income: Decimal, brackets: &[Bracket]) -> Option<&Bracket> {
    brackets.iter().rev().find(|b| income >= b.threshold)
}

/// Compulsory HECS/HELP repayment
///
/// Not marginal: the rate of the bracket containing the income applies to the
/// whole income, so crossing a threshold by a dollar raises the repayment on
/// every dollar.
pub fn help_repayment(repayment_income: Decimal, table: &TaxYearRateTable) -> Decimal {
    let income = repayment_income.max(Decimal::ZERO);
    help_bracket(income, &table.help_repayment).map_or(Decimal::ZERO, |b| income * b.rate)
}

/// All personal tax components for one financial year
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaxAssessment {
    pub taxable_income: Decimal,
    pub income_tax: Decimal,
    pub medicare_levy: Decimal,
    pub medicare_surcharge: Decimal,
    pub help_repayment: Decimal,
    pub marginal_rate: Decimal,
}

impl TaxAssessment {
    pub fn total(&self) -> Decimal {
        self.income_tax + self.medicare_levy + self.medicare_surcharge + self.help_repayment
    }
}

/// Assess tax on a taxable income for a taxpayer profile
pub fn assess(
    taxable_income: Decimal,
    table: &TaxYearRateTable,
    profile: &TaxProfile,
) -> TaxAssessment {
    let medicare = medicare_levy(taxable_income, table, profile.has_private_hospital_cover);
    let help = if profile.has_help_debt {
        help_repayment(taxable_income, table)
    } else {
        Decimal::ZERO
    };

    let assessment = TaxAssessment {
        taxable_income,
        income_tax: income_tax(taxable_income, table),
        medicare_levy: medicare.levy,
        medicare_surcharge: medicare.surcharge,
        help_repayment: help,
        marginal_rate: marginal_rate(taxable_income, table),
    };
    log::debug!(
        "Assessed {} for {}: tax={}, medicare={}, surcharge={}, help={}",
        taxable_income,
        table.year,
        assessment.income_tax,
        assessment.medicare_levy,
        assessment.medicare_surcharge,
        assessment.help_repayment
    );
    assessment
}
