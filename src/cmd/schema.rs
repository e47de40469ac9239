//! Schema command - print the expected input format

use clap::Args;
use rsutax::events::TaxInput;
use rsutax::tax::TaxYearRateTable;
use schemars::schema_for;

#[derive(Args, Debug)]
pub struct SchemaCommand {
    /// Which document to describe
    #[arg(value_enum, default_value = "input")]
    document: SchemaDocument,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum SchemaDocument {
    /// JSON Schema for the input document
    Input,
    /// JSON Schema for a `--rates` file (an array of rate tables)
    Rates,
    /// Field descriptions for vesting and sale records
    Fields,
}

impl SchemaCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        match self.document {
            SchemaDocument::Input => {
                let schema = schema_for!(TaxInput);
                println!("{}", serde_json::to_string_pretty(&schema)?);
            }
            SchemaDocument::Rates => {
                let schema = schema_for!(Vec<TaxYearRateTable>);
                println!("{}", serde_json::to_string_pretty(&schema)?);
            }
            SchemaDocument::Fields => print_fields(),
        }
        Ok(())
    }
}

fn print_fields() {
    for (section, fields) in [("vesting", VESTING_FIELDS), ("sales", SALE_FIELDS)] {
        println!("{}", section);
        for (name, required, description) in fields {
            let req = if *required { "required" } else { "optional" };
            println!("  {:22} ({:8})  {}", name, req, description);
        }
        println!();
    }
    println!("Dates are YYYY-MM-DD. Financial year labels are 2024-2025 or 2024-25.");
}

const VESTING_FIELDS: &[(&str, bool, &str)] = &[
    ("id", true, "Unique lot identifier, referenced by sales"),
    ("vest_date", false, "Vesting date; records without one are reported and skipped"),
    ("quantity", true, "Units vested"),
    ("fmv_per_unit", true, "Fair market value per unit at vesting (AUD)"),
    ("description", false, "Optional description"),
];

const SALE_FIELDS: &[(&str, bool, &str)] = &[
    ("id", true, "Unique sale identifier"),
    ("sale_date", false, "Sale date; records without one are reported and skipped"),
    ("quantity", true, "Units sold"),
    ("sale_price_per_unit", true, "Sale price per unit (AUD)"),
    ("vesting_id", true, "Id of the vesting lot the units came from"),
    (
        "held_over_12_months",
        false,
        "Overrides the holding period derived from the dates",
    ),
    ("description", false, "Optional description"),
];
