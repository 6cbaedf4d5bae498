//! SQLite persistence for normalized rows.
//!
//! Every call opens its own connection; rows are written one transaction at a
//! time with select-then-insert-or-update semantics keyed on the table's
//! primary key.

pub mod schema;

use std::str::FromStr;

use serde_json::{Number, Value};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{ConnectOptions, Connection, Row as _, TypeInfo, ValueRef};
use tracing::{debug, info};

use crate::error::{ScrapeError, ScrapeResult};
use crate::models::Row;

/// A persisted table: its name, primary key and typed columns
#[derive(Debug, Clone, Copy)]
pub struct Table {
    pub name: &'static str,
    pub primary_key: &'static str,
    /// `(column, SQL type)` pairs, primary key included
    pub columns: &'static [(&'static str, &'static str)],
}

impl Table {
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|(name, _)| *name == column)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|(name, _)| *name)
    }
}

pub const LISTINGS: Table = Table {
    name: "listings",
    primary_key: "url_append",
    columns: &[
        ("url_append", "TEXT"),
        ("domain", "TEXT"),
        ("domain_id", "TEXT"),
        ("postal_code", "TEXT"),
        ("street", "TEXT"),
        ("house_number", "INTEGER"),
        ("house_addition", "TEXT"),
        ("locale", "TEXT"),
        ("district", "TEXT"),
        ("rent_buy", "TEXT"),
        ("rent_total", "REAL"),
        ("rent_net", "REAL"),
        ("rent_calculation", "REAL"),
        ("service_costs", "REAL"),
        ("heating_costs", "REAL"),
        ("additional_costs", "REAL"),
        ("available_date", "TEXT"),
        ("available_end_date", "TEXT"),
        ("publish_date", "TEXT"),
        ("closing_date", "TEXT"),
        ("upload_date", "TEXT"),
        ("area_dwelling", "REAL"),
        ("room_count", "INTEGER"),
        ("room_name", "TEXT"),
        ("dwelling_type", "TEXT"),
        ("building_type", "TEXT"),
        ("kitchen_format", "TEXT"),
        ("floor", "INTEGER"),
        ("amenities", "TEXT"),
        ("additional_info", "TEXT"),
        ("corporation", "TEXT"),
        ("is_wongingruil", "BOOLEAN"),
        ("listing_traffic", "INTEGER"),
    ],
};

pub const MESSAGE: Table = Table {
    name: "message",
    primary_key: "sent_url_append",
    columns: &[
        ("sent_url_append", "TEXT"),
        ("recipient", "TEXT"),
        ("sender", "TEXT"),
        ("send_date", "TEXT"),
        ("sent_data_upload_date", "TEXT"),
    ],
};

/// Counts reported by [`Store::upsert`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
}

#[derive(Debug, Clone)]
pub struct Store {
    database_url: String,
}

impl Store {
    pub fn new(database_url: &str) -> Self {
        Self {
            database_url: database_url.to_string(),
        }
    }

    pub(crate) async fn connect(&self) -> ScrapeResult<SqliteConnection> {
        let options = SqliteConnectOptions::from_str(&self.database_url)?.create_if_missing(true);
        Ok(options.connect().await?)
    }

    /// Insert new rows and fully overwrite existing ones.
    ///
    /// Every row is checked for the primary key and for unknown columns
    /// before anything is written, so a bad batch leaves the table untouched.
    pub async fn upsert(&self, rows: &[Row], table: &Table) -> ScrapeResult<UpsertSummary> {
        for row in rows {
            check_row(row, table)?;
        }

        let mut conn = self.connect().await?;
        let mut summary = UpsertSummary::default();

        for row in rows {
            let key = &row[table.primary_key];
            let mut tx = conn.begin().await?;

            let select = format!(
                "SELECT 1 FROM {} WHERE {} = ?",
                table.name, table.primary_key
            );
            let existing = bind_value(sqlx::query(&select), key)
                .fetch_optional(&mut *tx)
                .await?;

            if existing.is_some() {
                let assignments: Vec<String> = table
                    .column_names()
                    .filter(|c| *c != table.primary_key)
                    .map(|c| format!("{c} = ?"))
                    .collect();
                let update = format!(
                    "UPDATE {} SET {} WHERE {} = ?",
                    table.name,
                    assignments.join(", "),
                    table.primary_key
                );
                let mut query = sqlx::query(&update);
                for column in table.column_names().filter(|c| *c != table.primary_key) {
                    query = bind_value(query, row.get(column).unwrap_or(&Value::Null));
                }
                bind_value(query, key).execute(&mut *tx).await?;
                summary.updated += 1;
            } else {
                let columns: Vec<&str> = table.column_names().collect();
                let insert = format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    table.name,
                    columns.join(", "),
                    vec!["?"; columns.len()].join(", ")
                );
                let mut query = sqlx::query(&insert);
                for column in &columns {
                    query = bind_value(query, row.get(*column).unwrap_or(&Value::Null));
                }
                query.execute(&mut *tx).await?;
                summary.inserted += 1;
            }

            tx.commit().await?;
            debug!("Upserted {} = {}", table.primary_key, key);
        }

        info!(
            "💾 {}: {} inserted, {} updated",
            table.name, summary.inserted, summary.updated
        );
        Ok(summary)
    }

    /// Read one row back by primary key, NULL columns omitted
    pub async fn fetch(&self, table: &Table, key: &str) -> ScrapeResult<Option<Row>> {
        let mut conn = self.connect().await?;
        let select = format!(
            "SELECT * FROM {} WHERE {} = ?",
            table.name, table.primary_key
        );
        let found = sqlx::query(&select)
            .bind(key)
            .fetch_optional(&mut conn)
            .await?;
        found.map(|row| decode_row(&row)).transpose()
    }

    pub async fn count(&self, table: &Table) -> ScrapeResult<i64> {
        let mut conn = self.connect().await?;
        let row = sqlx::query(&format!("SELECT COUNT(*) FROM {}", table.name))
            .fetch_one(&mut conn)
            .await?;
        Ok(row.try_get::<i64, _>(0)?)
    }
}

fn check_row(row: &Row, table: &Table) -> ScrapeResult<()> {
    if row.get(table.primary_key).map_or(true, Value::is_null) {
        return Err(ScrapeError::MissingPrimaryKey {
            key: table.primary_key.to_string(),
            table: table.name,
        });
    }
    if let Some(column) = row.keys().find(|k| !table.has_column(k)) {
        return Err(ScrapeError::UnknownColumn {
            column: column.clone(),
            table: table.name,
        });
    }
    Ok(())
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        Value::String(s) => query.bind(s.clone()),
        // Nested values never reach a row after remapping; store them as JSON text.
        other => query.bind(other.to_string()),
    }
}

fn decode_row(row: &SqliteRow) -> ScrapeResult<Row> {
    let mut decoded = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(index)?;
        if raw.is_null() {
            continue;
        }
        let value = match raw.type_info().name() {
            "INTEGER" | "BOOLEAN" => Value::from(row.try_get::<i64, _>(index)?),
            "REAL" => Number::from_f64(row.try_get::<f64, _>(index)?)
                .map_or(Value::Null, Value::Number),
            _ => Value::from(row.try_get::<String, _>(index)?),
        };
        decoded.insert(sqlx::Column::name(column).to_string(), value);
    }
    Ok(decoded)
}
