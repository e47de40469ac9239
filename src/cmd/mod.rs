pub mod optimize;
pub mod rates;
pub mod schema;
pub mod summary;
pub mod validate;

use rsutax::events::{self, TaxInput};
use rsutax::tax::RateTables;
use rust_decimal::Decimal;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Read the input document from a JSON file (or stdin with "-")
pub fn read_input(path: &Path) -> anyhow::Result<TaxInput> {
    if path.as_os_str() == "-" {
        read_from_stdin()
    } else {
        let file = File::open(path)?;
        events::read_input_json(BufReader::new(file))
    }
}

fn read_from_stdin() -> anyhow::Result<TaxInput> {
    let stdin = io::stdin();
    let mut reader = BufReader::new(stdin.lock());

    let mut buffer = Vec::new();
    reader.read_to_end(&mut buffer)?;

    if buffer.is_empty() {
        anyhow::bail!("No input received. Provide a file or pipe data to stdin.");
    }

    events::read_input_json(io::Cursor::new(buffer))
}

/// Built-in rate tables, or those in `path` when given
pub fn load_rates(path: Option<&Path>) -> anyhow::Result<RateTables> {
    match path {
        Some(path) => {
            let file = File::open(path)?;
            let tables = RateTables::read_json(BufReader::new(file))?;
            log::info!("Loaded rate tables from {}", path.display());
            Ok(tables)
        }
        None => Ok(RateTables::australian()),
    }
}

fn format_aud(amount: Decimal) -> String {
    if amount < Decimal::ZERO {
        format!("-${:.2}", amount.abs())
    } else {
        format!("${:.2}", amount)
    }
}

fn format_opt_aud(amount: Option<Decimal>) -> String {
    amount.map_or_else(|| "n/a".to_string(), format_aud)
}

fn format_quantity(qty: Decimal) -> String {
    let s = format!("{:.8}", qty);
    let trimmed = s.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_string()
}

fn format_pct(rate: Decimal) -> String {
    format!("{}%", (rate * Decimal::ONE_HUNDRED).normalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn formats_money_and_rates() {
        assert_eq!(format_aud(dec!(22967)), "$22967.00");
        assert_eq!(format_aud(dec!(-400.5)), "-$400.50");
        assert_eq!(format_opt_aud(None), "n/a");
        assert_eq!(format_quantity(dec!(100.50000000)), "100.5");
        assert_eq!(format_quantity(dec!(70)), "70");
        assert_eq!(format_pct(dec!(0.325)), "32.5%");
        assert_eq!(format_pct(dec!(0.02)), "2%");
    }
}
