use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

/// Australian tax on RSU vesting, sales and capital gains
#[derive(Parser, Debug)]
#[command(name = "rsutax", version, about)]
struct Cli {
    /// JSON file of rate tables to use instead of the built-in ones
    #[arg(long, global = true)]
    rates: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Per-year income, capital gains and tax
    Summary(cmd::summary::SummaryCommand),
    /// Rank sale timings for the planned lots
    Optimize(cmd::optimize::OptimizeCommand),
    /// Report data quality issues (exit code 1 if any)
    Validate(cmd::validate::ValidateCommand),
    /// Print the JSON Schema of the input document
    Schema(cmd::schema::SchemaCommand),
    /// Show the rate tables in use
    Rates(cmd::rates::RatesCommand),
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let cli = Cli::parse();
    let rates = cli.rates.as_deref();
    match cli.command {
        Command::Summary(summary) => summary.exec(rates),
        Command::Optimize(optimize) => optimize.exec(rates),
        Command::Validate(validate) => validate.exec(rates),
        Command::Schema(schema) => schema.exec(),
        Command::Rates(show) => show.exec(rates),
    }
}
