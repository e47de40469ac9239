pub mod cgt;
pub mod income;
pub mod optimize;
pub mod rates;
pub mod summary;
pub mod warnings;
pub mod year;

// Flat public surface for domain types and functions.
pub use cgt::{gain, net_capital_gain, LotGain, NetCapitalGain, CGT_DISCOUNT_RATE};
pub use income::{assess, help_repayment, income_tax, medicare_levy, TaxAssessment};
pub use optimize::{
    open_lots, recommend, AdvisorConfig, OpenLot, Portfolio, Recommendation, ScenarioOutcome,
};
pub use rates::{Bracket, RateTableError, RateTables, Schedule, TaxYearRateTable};
pub use summary::{summarize, YearComparison, YearReport, YearSummary};
pub use warnings::Warning;
pub use year::{
    days_to_next_financial_year, is_long_term_holding, resolve, FinancialYear, YearLabel,
};
