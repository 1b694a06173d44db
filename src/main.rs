//! heapstore - inspect and edit heap-file tables from the command line

use anyhow::{bail, Context, Result};
use clap::{Parser as ClapParser, Subcommand};
use heapstore::access::{Column, DataType, Schema, Value};
use heapstore::config::{StorageConfig, DEFAULT_MAX_PAGES, DEFAULT_PAGE_SIZE};
use heapstore::database::Database;
use log::info;
use std::path::PathBuf;

/// heapstore - transactional heap-file storage
#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Data directory
    #[arg(short = 'D', long, default_value = "./heapstore_data")]
    data_dir: PathBuf,

    /// Page size in bytes
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: usize,

    /// Buffer pool capacity in pages
    #[arg(long, default_value_t = DEFAULT_MAX_PAGES)]
    max_pages: usize,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a table from `name:type` column specs (types: int, varchar)
    CreateTable { name: String, columns: Vec<String> },
    /// Insert one row, one value per column
    Insert { table: String, values: Vec<String> },
    /// Print every row of a table
    Scan { table: String },
    /// List registered tables
    Tables,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let config = StorageConfig::new(args.page_size, args.max_pages);
    let db = Database::open(&args.data_dir, config).context("Failed to open database")?;
    info!("opened {}", args.data_dir.display());

    match args.command {
        Command::CreateTable { name, columns } => create_table(&db, &name, &columns),
        Command::Insert { table, values } => insert(&db, &table, &values),
        Command::Scan { table } => scan(&db, &table),
        Command::Tables => {
            for table in db.catalog().tables() {
                let columns: Vec<String> = table
                    .schema
                    .columns()
                    .iter()
                    .map(|c| format!("{}:{}", c.name, c.data_type))
                    .collect();
                println!("{}\t{}\t{}", table.table_id, table.table_name, columns.join(" "));
            }
            Ok(())
        }
    }
}

fn create_table(db: &Database, name: &str, specs: &[String]) -> Result<()> {
    let columns = specs
        .iter()
        .map(|spec| {
            let (column, type_name) = spec
                .split_once(':')
                .with_context(|| format!("column '{}' is not name:type", spec))?;
            let data_type = DataType::parse(type_name)
                .with_context(|| format!("unknown type '{}'", type_name))?;
            Ok(Column::new(column, data_type))
        })
        .collect::<Result<Vec<_>>>()?;
    if columns.is_empty() {
        bail!("a table needs at least one column");
    }

    let table_id = db.create_table(name, Schema::new(columns))?;
    println!("created table {} ({})", name, table_id);
    Ok(())
}

fn insert(db: &Database, table: &str, texts: &[String]) -> Result<()> {
    let table_id = db.table_id(table)?;
    let schema = db.catalog().schema(table_id)?;
    if texts.len() != schema.len() {
        bail!("table '{}' has {} columns, got {} values", table, schema.len(), texts.len());
    }

    let values = schema
        .columns()
        .iter()
        .zip(texts)
        .map(|(column, text)| {
            Value::parse(text, column.data_type).with_context(|| {
                format!("'{}' is not a valid {} for column {}", text, column.data_type, column.name)
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let txn = db.begin();
    let record_id = txn.insert(table_id, values)?;
    txn.commit()?;

    println!("inserted {}", record_id);
    Ok(())
}

fn scan(db: &Database, table: &str) -> Result<()> {
    let table_id = db.table_id(table)?;

    let txn = db.begin();
    for tuple in txn.scan(table_id)? {
        println!("{}", tuple?);
    }
    txn.commit()?;

    Ok(())
}
