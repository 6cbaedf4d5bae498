use tracing::info;

use crate::error::ScrapeResult;
use crate::store::{Store, Table, LISTINGS, MESSAGE};

pub fn create_table_sql(table: &Table) -> String {
    let columns: Vec<String> = table
        .columns
        .iter()
        .map(|(name, sql_type)| {
            if *name == table.primary_key {
                format!("{name} {sql_type} PRIMARY KEY NOT NULL")
            } else {
                format!("{name} {sql_type}")
            }
        })
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        table.name,
        columns.join(", ")
    )
}

/// Create the listing and message tables when they do not exist yet
pub async fn ensure_schema(store: &Store) -> ScrapeResult<()> {
    let mut conn = store.connect().await?;
    for table in [&LISTINGS, &MESSAGE] {
        sqlx::query(&create_table_sql(table))
            .execute(&mut conn)
            .await?;
    }
    info!("Database schema ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_key_is_declared_once() {
        let sql = create_table_sql(&MESSAGE);
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS message (sent_url_append TEXT PRIMARY KEY NOT NULL, \
             recipient TEXT, sender TEXT, send_date TEXT, sent_data_upload_date TEXT)"
        );
        assert_eq!(create_table_sql(&LISTINGS).matches("PRIMARY KEY").count(), 1);
    }
}
