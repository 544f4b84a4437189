//! SQLite tasks. Databases are always opened read-only.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OpenFlags};
use serde::Deserialize;

use super::{write_output, DecodedArgs, Param, TaskContext, TaskError, Tool};

/// Total sales of one ticket type.
pub struct TicketSales;

#[derive(Deserialize)]
struct TicketSalesArgs {
    filename: PathBuf,
    output_filename: PathBuf,
    ticket_type: String,
}

#[async_trait]
impl Tool for TicketSales {
    fn name(&self) -> &str {
        "ticket_sales"
    }

    fn description(&self) -> &str {
        "Computes the total sales (sum of units * price) of one ticket type from the `tickets` table of a SQLite database and writes the number to a text file. Defaults to the \"Gold\" ticket type."
    }

    fn parameters(&self) -> Vec<Param> {
        vec![
            Param::path("filename", "SQLite database with a `tickets(type, units, price)` table.")
                .pattern(r"\.db$")
                .default("ticket-sales.db"),
            Param::path("output_filename", "Text file the total is written to.")
                .pattern(r"\.txt$")
                .default("ticket-sales-gold.txt"),
            Param::string("ticket_type", "Ticket type to total, matched case-insensitively.")
                .default("Gold"),
        ]
    }

    async fn execute(&self, args: DecodedArgs, _ctx: &TaskContext) -> Result<String, TaskError> {
        let args: TicketSalesArgs = args.into_typed()?;

        let db = args.filename.clone();
        let ticket_type = args.ticket_type.clone();
        let total = tokio::task::spawn_blocking(move || -> Result<SqlValue, TaskError> {
            let conn = open_read_only(&db)?;
            let total = conn.query_row(
                "SELECT SUM(units * price) FROM tickets WHERE LOWER(TRIM(type)) = LOWER(TRIM(?1))",
                [&ticket_type],
                |row| row.get::<_, SqlValue>(0),
            )?;
            Ok(total)
        })
        .await??;

        let total = match total {
            SqlValue::Null => "0".to_string(),
            other => format_value(&other),
        };
        write_output(&args.output_filename, &total).await?;
        Ok(format!("Total {} ticket sales: {}", args.ticket_type, total))
    }
}

/// Run an arbitrary read-only query and save the result as CSV.
pub struct RunSqlQuery;

#[derive(Deserialize)]
struct RunSqlQueryArgs {
    db_path: PathBuf,
    query: String,
    output_file: PathBuf,
}

#[async_trait]
impl Tool for RunSqlQuery {
    fn name(&self) -> &str {
        "run_sql_query"
    }

    fn description(&self) -> &str {
        "Runs a read-only SQL query against a SQLite database file and saves the result rows as CSV (with a header row) to an output file."
    }

    fn parameters(&self) -> Vec<Param> {
        vec![
            Param::path("db_path", "SQLite database file.").pattern(r"\.db$"),
            Param::string("query", "SQL query to execute. Only read queries are allowed."),
            Param::path("output_file", "File the CSV result is written to."),
        ]
    }

    async fn execute(&self, args: DecodedArgs, _ctx: &TaskContext) -> Result<String, TaskError> {
        let args: RunSqlQueryArgs = args.into_typed()?;

        let db = args.db_path.clone();
        let query = args.query.clone();
        let (csv, rows) = tokio::task::spawn_blocking(move || query_to_csv(&db, &query)).await??;

        write_output(&args.output_file, csv).await?;
        Ok(format!("Query returned {} rows", rows))
    }
}

fn open_read_only(path: &Path) -> Result<Connection, TaskError> {
    if !path.is_file() {
        return Err(TaskError::InvalidData(format!(
            "database {} does not exist",
            path.display()
        )));
    }
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    Ok(conn)
}

fn query_to_csv(db: &Path, query: &str) -> Result<(Vec<u8>, usize), TaskError> {
    let conn = open_read_only(db)?;
    let mut stmt = conn.prepare(query)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&columns).map_err(csv_error)?;

    let mut rows = stmt.query([])?;
    let mut count = 0;
    while let Some(row) = rows.next()? {
        let mut record = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            let value: SqlValue = row.get(i)?;
            record.push(match value {
                SqlValue::Null => String::new(),
                other => format_value(&other),
            });
        }
        writer.write_record(&record).map_err(csv_error)?;
        count += 1;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| TaskError::Internal(e.to_string()))?;
    Ok((bytes, count))
}

/// Render a SQL value. Reals keep a fractional part (`1500.0`, not `1500`).
fn format_value(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => String::new(),
        SqlValue::Integer(i) => i.to_string(),
        SqlValue::Real(f) => format!("{:?}", f),
        SqlValue::Text(s) => s.clone(),
        SqlValue::Blob(b) => base64::engine::general_purpose::STANDARD.encode(b),
    }
}

fn csv_error(e: csv::Error) -> TaskError {
    TaskError::Internal(format!("CSV encoding failed: {}", e))
}
