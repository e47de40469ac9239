//! Australian tax on RSU vesting and sale: year summaries and sale timing advice

pub mod events;
pub mod tax;
