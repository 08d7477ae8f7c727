//! heapdb command-line front end.

use anyhow::{bail, Context, Result};
use clap::{Parser as ClapParser, Subcommand};
use heapdb::access::{DataType, FieldInfo, Tuple, TupleDesc, Value};
use heapdb::config::DatabaseConfig;
use heapdb::database::Database;
use heapdb::executor::{
    Aggregate, AggregateOp, Delete, Insert, OpIterator, Operator, SeqScan, ValuesExecutor,
};
use log::debug;
use std::path::PathBuf;

/// A page-based storage engine with strict two-phase locking
#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Data directory
    #[arg(short = 'D', long, default_value = "./heapdb_data")]
    data_dir: PathBuf,

    /// Page size in bytes (overrides HEAPDB_PAGE_SIZE)
    #[arg(long)]
    page_size: Option<usize>,

    /// Buffer pool capacity in pages (overrides HEAPDB_POOL_PAGES)
    #[arg(long)]
    pool_pages: Option<usize>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a table; columns are written as type[:name]
    Create {
        table: String,
        #[arg(required = true)]
        columns: Vec<String>,
    },
    /// Insert one row
    Insert {
        table: String,
        #[arg(required = true)]
        values: Vec<String>,
    },
    /// Print every row of a table
    Scan { table: String },
    /// Delete the rows whose field equals a value
    Delete {
        table: String,
        field: usize,
        value: String,
    },
    /// Aggregate one field, optionally grouped by another
    Aggregate {
        table: String,
        op: AggregateOp,
        field: usize,
        #[arg(long)]
        group_by: Option<usize>,
    },
    /// List tables with their page counts
    Tables,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let mut config = DatabaseConfig::from_env()?;
    if let Some(page_size) = args.page_size {
        config.page_size = page_size;
    }
    if let Some(pages) = args.pool_pages {
        config.buffer_pool_pages = pages;
    }

    let db = Database::open(&args.data_dir, config).context("Failed to open database")?;
    debug!("Running {:?}", args.command);

    match args.command {
        Command::Create { table, columns } => create_table(&db, &table, &columns),
        Command::Insert { table, values } => insert_row(&db, &table, &values),
        Command::Scan { table } => scan_table(&db, &table),
        Command::Delete {
            table,
            field,
            value,
        } => delete_rows(&db, &table, field, &value),
        Command::Aggregate {
            table,
            op,
            field,
            group_by,
        } => aggregate(&db, &table, op, field, group_by),
        Command::Tables => list_tables(&db),
    }
}

fn parse_column(spec: &str) -> Result<FieldInfo> {
    let (type_name, name) = match spec.split_once(':') {
        Some((type_name, name)) => (type_name, Some(name.to_string())),
        None => (spec, None),
    };
    let data_type = DataType::from_name(type_name)
        .with_context(|| format!("invalid column spec '{}'", spec))?;
    Ok(FieldInfo::new(data_type, name))
}

fn create_table(db: &Database, table: &str, columns: &[String]) -> Result<()> {
    let fields = columns
        .iter()
        .map(|spec| parse_column(spec))
        .collect::<Result<Vec<_>>>()?;
    let desc = TupleDesc::from_fields(fields);

    let table_id = db.create_table(table, desc.clone())?;
    println!("Created table '{}' ({}) with id {}", table, desc, table_id);
    Ok(())
}

fn insert_row(db: &Database, table: &str, values: &[String]) -> Result<()> {
    let table_id = db.table_id(table)?;
    let desc = db.catalog().tuple_desc(table_id)?;
    if values.len() != desc.num_fields() {
        bail!(
            "table '{}' has {} fields, got {} values",
            table,
            desc.num_fields(),
            values.len()
        );
    }

    let row = desc
        .types()
        .zip(values)
        .map(|(data_type, text)| data_type.parse(text))
        .collect::<Result<Vec<Value>, _>>()?;

    let txn = db.begin();
    let context = db.context(txn.id());
    let values = ValuesExecutor::from_values(desc, vec![row])?;
    let mut insert: Operator = Insert::new(&context, table_id, values.into())?.into();
    let inserted = insert.collect()?;
    txn.commit()?;

    print_rows(&inserted);
    Ok(())
}

fn scan_table(db: &Database, table: &str) -> Result<()> {
    let table_id = db.table_id(table)?;

    let txn = db.begin();
    let mut scan: Operator = SeqScan::new(&db.context(txn.id()), table_id)?.into();
    let rows = scan.collect()?;
    println!("{}", scan.tuple_desc());
    txn.commit()?;

    print_rows(&rows);
    Ok(())
}

fn delete_rows(db: &Database, table: &str, field: usize, value: &str) -> Result<()> {
    let table_id = db.table_id(table)?;
    let desc = db.catalog().tuple_desc(table_id)?;
    let target = desc.field_type(field)?.parse(value)?;

    let txn = db.begin();
    let context = db.context(txn.id());

    let mut scan: Operator = SeqScan::new(&context, table_id)?.into();
    let mut matching = Vec::new();
    for tuple in scan.collect()? {
        if tuple.value(field)? == &target {
            matching.push(tuple);
        }
    }

    let values = ValuesExecutor::new(desc, matching)?;
    let mut delete: Operator = Delete::new(&context, values.into()).into();
    let deleted = delete.collect()?;
    txn.commit()?;

    print_rows(&deleted);
    Ok(())
}

fn aggregate(
    db: &Database,
    table: &str,
    op: AggregateOp,
    field: usize,
    group_by: Option<usize>,
) -> Result<()> {
    let table_id = db.table_id(table)?;

    let txn = db.begin();
    let scan = SeqScan::new(&db.context(txn.id()), table_id)?;
    let mut agg: Operator = Aggregate::new(scan.into(), field, group_by, op)?.into();
    let rows = agg.collect()?;
    println!("{}", agg.tuple_desc());
    txn.commit()?;

    print_rows(&rows);
    Ok(())
}

fn list_tables(db: &Database) -> Result<()> {
    for info in db.catalog().list_tables() {
        println!(
            "{}\t{}\t{} pages\t({})",
            info.table_id,
            info.table_name,
            info.file.num_pages()?,
            info.file.tuple_desc()
        );
    }
    Ok(())
}

fn print_rows(rows: &[Tuple]) {
    for row in rows {
        println!("{}", row);
    }
}
