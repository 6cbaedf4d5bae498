use tracing::{error, info};

use crate::models::{Row, RunContext};
use crate::scrapers::SourceAdapter;

/// Run every adapter in turn and gather its rows, stamped with the batch time.
///
/// A failing source is logged and skipped so the others still land.
pub async fn collect(adapters: Vec<Box<dyn SourceAdapter>>, ctx: &RunContext) -> Vec<Row> {
    let mut all_rows = Vec::new();

    for mut adapter in adapters {
        let name = adapter.source().name();
        info!("🔍 Collecting {}", name);

        match adapter.parse_all().await {
            Ok(mut rows) => {
                ctx.stamp(&mut rows);
                info!("✅ {} yielded {} rows", name, rows.len());
                all_rows.extend(rows);
            }
            Err(e) => error!("❌ {} failed: {:#}", name, e),
        }
    }

    all_rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RawRecord, Source};
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use serde_json::{json, Value};

    struct Canned {
        source: Source,
        records: Option<Vec<Value>>,
    }

    #[async_trait]
    impl SourceAdapter for Canned {
        fn source(&self) -> Source {
            self.source
        }

        async fn discover_all(&mut self) -> Result<Vec<RawRecord>> {
            match &self.records {
                Some(records) => Ok(records.iter().cloned().map(RawRecord::Json).collect()),
                None => bail!("site unreachable"),
            }
        }

        async fn parse_one(&mut self, raw: &RawRecord) -> Result<Option<Row>> {
            let RawRecord::Json(Value::Object(row)) = raw else {
                return Ok(None);
            };
            Ok(Some(row.clone()))
        }
    }

    #[tokio::test]
    async fn failing_source_does_not_stop_the_run() {
        let ctx = RunContext::new(
            NaiveDate::from_ymd_opt(2024, 6, 1)
                .unwrap()
                .and_hms_opt(9, 15, 42)
                .unwrap(),
        );
        let adapters: Vec<Box<dyn SourceAdapter>> = vec![
            Box::new(Canned {
                source: Source::Room,
                records: None,
            }),
            Box::new(Canned {
                source: Source::Kamernet,
                records: Some(vec![json!({"url_append": "/a"}), json!("junk"), json!({"url_append": "/b"})]),
            }),
        ];

        let rows = collect(adapters, &ctx).await;

        assert_eq!(rows.len(), 2);
        assert!(rows
            .iter()
            .all(|r| r["upload_date"] == json!("2024-06-01 09:15:00")));
    }
}
