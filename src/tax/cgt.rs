//! Capital gains per sale lot and per-year netting
//!
//! The cost base of a sold unit is its fair market value at vesting. A gain on a
//! lot held for more than 12 months is discount-eligible; losses never are.
//!
//! Netting within a year runs in a fixed order:
//! 1. current-year losses, then losses carried in, reduce non-discountable gains
//! 2. what is left of the losses reduces discount-eligible gains
//! 3. the 50% discount applies to the remaining discount-eligible gains
//! 4. unused losses carry forward to the next year

use crate::events::{SaleEvent, VestingEvent};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

/// General CGT discount for individuals
pub const CGT_DISCOUNT_RATE: Decimal = dec!(0.5);

/// Gain or loss on one sale
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LotGain {
    pub sale_id: String,
    pub vesting_id: String,
    pub sale_date: Option<NaiveDate>,
    pub quantity: Decimal,
    pub proceeds: Decimal,
    pub cost_base: Decimal,
    pub held_over_12_months: bool,
    pub raw_gain: Decimal,
    /// Gain after the discount, before any loss netting
    pub discounted_gain: Decimal,
}

impl LotGain {
    /// Positive gain held long enough to attract the discount
    pub fn discount_eligible(&self) -> bool {
        self.held_over_12_months && self.raw_gain > Decimal::ZERO
    }
}

/// Gain on selling `sale.quantity` units from the `vest` lot
pub fn gain(sale: &SaleEvent, vest: &VestingEvent) -> LotGain {
    let held_over_12_months = sale.held_over_12_months(vest);
    let cost_base = vest.fmv_per_unit * sale.quantity;
    let proceeds = sale.proceeds();
    let raw_gain = (sale.sale_price_per_unit - vest.fmv_per_unit) * sale.quantity;

    let discounted_gain = if held_over_12_months && raw_gain > Decimal::ZERO {
        raw_gain * (Decimal::ONE - CGT_DISCOUNT_RATE)
    } else {
        raw_gain
    };

    log::debug!(
        "Sale {} of lot {}: qty={}, proceeds={}, cost={}, gain={}, discounted={}, long_term={}",
        sale.id,
        vest.id,
        sale.quantity,
        proceeds,
        cost_base,
        raw_gain,
        discounted_gain,
        held_over_12_months
    );

    LotGain {
        sale_id: sale.id.clone(),
        vesting_id: vest.id.clone(),
        sale_date: sale.sale_date,
        quantity: sale.quantity,
        proceeds,
        cost_base,
        held_over_12_months,
        raw_gain,
        discounted_gain,
    }
}

/// Result of netting one year's lot gains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct NetCapitalGain {
    /// Positive gains eligible for the discount
    pub discountable_gains: Decimal,
    /// Positive gains not eligible for the discount
    pub other_gains: Decimal,
    /// Losses realised this year (as a positive amount)
    pub current_losses: Decimal,
    /// Losses brought forward from earlier years
    pub carried_in: Decimal,
    /// Portion of `carried_in` absorbed this year
    pub carried_in_used: Decimal,
    pub discount: Decimal,
    /// Amount included in taxable income
    pub net_gain: Decimal,
    /// Losses left over for the next year
    pub carried_forward: Decimal,
}

impl NetCapitalGain {
    /// Gains before losses and discount
    pub fn gross_gains(&self) -> Decimal {
        self.discountable_gains + self.other_gains
    }

    /// Sum of raw gains and losses for the year, before carried losses and discount
    pub fn total_raw_gain(&self) -> Decimal {
        self.gross_gains() - self.current_losses
    }

    /// Current-year and carried-in losses applied against gains
    pub fn losses_applied(&self) -> Decimal {
        self.current_losses + self.carried_in - self.carried_forward
    }
}

/// Net the year's lot gains against current and carried-in losses
pub fn net_capital_gain(lots: &[LotGain], carried_in: Decimal) -> NetCapitalGain {
    let carried_in = carried_in.max(Decimal::ZERO);
    let mut discountable = Decimal::ZERO;
    let mut other = Decimal::ZERO;
    let mut current_losses = Decimal::ZERO;

    for lot in lots {
        if lot.raw_gain < Decimal::ZERO {
            current_losses -= lot.raw_gain;
        } else if lot.discount_eligible() {
            discountable += lot.raw_gain;
        } else {
            other += lot.raw_gain;
        }
    }

    let mut available = current_losses + carried_in;
    let against_other = available.min(other);
    available -= against_other;
    let against_discountable = available.min(discountable);
    available -= against_discountable;

    let remaining_discountable = discountable - against_discountable;
    let discount = remaining_discountable * CGT_DISCOUNT_RATE;
    let net_gain = (other - against_other) + remaining_discountable - discount;

    // current-year losses are absorbed before carried-in ones
    let used = against_other + against_discountable;
    let carried_in_used = (used - current_losses).max(Decimal::ZERO);

    NetCapitalGain {
        discountable_gains: discountable,
        other_gains: other,
        current_losses,
        carried_in,
        carried_in_used,
        discount,
        net_gain,
        carried_forward: available,
    }
}
