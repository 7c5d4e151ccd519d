//! Target table layout and SQL generation for both dialects.

use std::fmt::Write as _;

use pg_escape::quote_identifier;

/// Natural key of the target table.
pub const KEY_COLUMN: &str = "event_id";

/// SQL dialect of a sink backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

/// One column of the target table.
#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub pg_type: &'static str,
    pub sqlite_type: &'static str,
    /// Parameter cast so bind types are fixed regardless of inference.
    pub pg_cast: &'static str,
    pub nullable: bool,
}

const fn column(
    name: &'static str,
    pg_type: &'static str,
    sqlite_type: &'static str,
    pg_cast: &'static str,
    nullable: bool,
) -> Column {
    Column {
        name,
        pg_type,
        sqlite_type,
        pg_cast,
        nullable,
    }
}

/// Columns in bind order. Must match the parameter order used by the sinks.
pub const COLUMNS: &[Column] = &[
    column("event_id", "TEXT", "TEXT", "::text", false),
    column("event_type", "TEXT", "TEXT", "::text", false),
    column("user_id", "TEXT", "TEXT", "::text", true),
    column("product_id", "TEXT", "TEXT", "::text", true),
    column("session_id", "TEXT", "TEXT", "::text", true),
    column("timestamp", "TIMESTAMPTZ", "TEXT", "::timestamptz", false),
    column("ingestion_timestamp", "TIMESTAMPTZ", "TEXT", "::timestamptz", false),
    column("device", "TEXT", "TEXT", "::text", false),
    column("browser", "TEXT", "TEXT", "::text", false),
    column("location", "TEXT", "TEXT", "::text", false),
    column("price", "NUMERIC(12,2)", "TEXT", "::text::numeric(12,2)", false),
    column("quantity", "INTEGER", "INTEGER", "::int4", false),
    column("discount_applied", "BOOLEAN", "INTEGER", "::bool", false),
    column("product_category", "TEXT", "TEXT", "::text", true),
];

/// Idempotent DDL for the target table. Never alters an existing table.
pub fn create_table_sql(dialect: Dialect, table: &str) -> String {
    let columns: Vec<String> = COLUMNS
        .iter()
        .map(|c| {
            let ty = match dialect {
                Dialect::Postgres => c.pg_type,
                Dialect::Sqlite => c.sqlite_type,
            };
            let constraint = if c.name == KEY_COLUMN {
                " PRIMARY KEY"
            } else if !c.nullable {
                " NOT NULL"
            } else {
                ""
            };
            format!("    {} {}{}", quote_identifier(c.name), ty, constraint)
        })
        .collect();

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
        quote_identifier(table),
        columns.join(",\n")
    )
}

/// `ON CONFLICT` clause that overwrites every non-key column.
pub fn upsert_clause() -> String {
    let updates: Vec<String> = COLUMNS
        .iter()
        .filter(|c| c.name != KEY_COLUMN)
        .map(|c| {
            let name = quote_identifier(c.name);
            format!("{name} = EXCLUDED.{name}")
        })
        .collect();

    format!(
        " ON CONFLICT ({}) DO UPDATE SET {}",
        quote_identifier(KEY_COLUMN),
        updates.join(", ")
    )
}

/// Multi-row upsert statement for `rows` rows.
///
/// Parameters are numbered row-major: row `r`, column `c` is
/// parameter `r * COLUMNS.len() + c + 1`.
pub fn upsert_sql(dialect: Dialect, table: &str, rows: usize) -> String {
    let col_list = COLUMNS
        .iter()
        .map(|c| quote_identifier(c.name))
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = format!("INSERT INTO {} ({}) VALUES ", quote_identifier(table), col_list);

    for row in 0..rows {
        if row > 0 {
            sql.push_str(", ");
        }
        sql.push('(');
        for (pos, col) in COLUMNS.iter().enumerate() {
            if pos > 0 {
                sql.push_str(", ");
            }
            let idx = row * COLUMNS.len() + pos + 1;
            let _ = match dialect {
                Dialect::Postgres => write!(sql, "${idx}{}", col.pg_cast),
                Dialect::Sqlite => write!(sql, "?{idx}"),
            };
        }
        sql.push(')');
    }

    sql.push_str(&upsert_clause());
    sql
}
