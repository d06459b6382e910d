use clap::{Args, Parser, Subcommand};

mod validators;

#[derive(Parser)]
#[command(name = "hermitdb")]
#[command(about = "Inspect tables of a HermitDB data directory", long_about = None)]
#[command(version = "0.1.0")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List tables with their record and page counts.
    Tables(TablesArgs),
    /// Print the schema and records of one table.
    Inspect(InspectArgs),
}

#[derive(Args)]
pub struct TablesArgs {
    #[arg(short = 'D', long, value_parser = validators::validate_directory)]
    pub data_dir: String,
}

#[derive(Args)]
pub struct InspectArgs {
    #[arg(short = 'D', long, value_parser = validators::validate_directory)]
    pub data_dir: String,

    #[arg(short = 'T', long)]
    pub table: String,

    /// Maximum number of records to print.
    #[arg(short = 'L', long, default_value_t = 20)]
    pub limit: usize,
}
