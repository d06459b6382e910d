use clap::Parser;
use cli::{Cli, Commands, InspectArgs, TablesArgs};
use hermitdb::{
    database::{Database, DatabaseConfig},
    utils::debug_table::DebugTable,
};

mod cli;

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = DatabaseConfig::from_env()?;
    simple_logger::init_with_level(config.log_level)?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Tables(TablesArgs { data_dir }) => {
            let db = Database::open(DatabaseConfig {
                data_dir: data_dir.into(),
                ..config
            })?;

            let mut table = DebugTable::new();
            table.add_column("table");
            table.add_column("records");
            table.add_column("pages");
            table.add_column("record size");
            for name in db.table_names() {
                let heap = db.table(&name)?;
                table.insert_row([
                    name,
                    heap.num_records().to_string(),
                    heap.num_data_pages().to_string(),
                    heap.schema().size().to_string(),
                ]);
            }
            println!("{table}");
        }
        Commands::Inspect(InspectArgs {
            data_dir,
            table,
            limit,
        }) => {
            let db = Database::open(DatabaseConfig {
                data_dir: data_dir.into(),
                ..config
            })?;
            let heap = db.table(&table)?;

            let mut schema = DebugTable::new();
            schema.add_column("field");
            schema.add_column("type");
            for column in heap.schema().columns() {
                schema.insert_row([column.name.clone(), column.data_type.to_string()]);
            }
            println!("{schema}");

            let mut records = DebugTable::new();
            records.add_column("rid");
            for name in heap.schema().field_names() {
                records.add_column(name);
            }
            for entry in heap.iter_with_ids().take(limit) {
                let (rid, record) = entry?;
                records.insert_row(
                    std::iter::once(rid.to_string())
                        .chain(record.values().iter().map(ToString::to_string)),
                );
            }
            println!("{records}");

            if heap.num_records() > limit {
                log::info!(
                    "showing {limit} of {} records of {table}",
                    heap.num_records()
                );
            }
        }
    }

    Ok(())
}
