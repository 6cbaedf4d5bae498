use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::models::{RawRecord, Row, Source};

/// Common contract for every rental listing source
#[async_trait]
pub trait SourceAdapter: Send {
    fn source(&self) -> Source;

    /// Page through the site and return one raw record per listing
    async fn discover_all(&mut self) -> Result<Vec<RawRecord>>;

    /// Normalize one listing; `Ok(None)` skips it, `Err` aborts the source
    async fn parse_one(&mut self, raw: &RawRecord) -> Result<Option<Row>>;

    async fn parse_all(&mut self) -> Result<Vec<Row>> {
        let raws = self.discover_all().await?;
        info!("Starting {} parse of {} records", self.source().name(), raws.len());

        let mut rows = Vec::with_capacity(raws.len());
        for raw in &raws {
            if let Some(row) = self.parse_one(raw).await? {
                rows.push(row);
            }
        }

        info!(
            "Finished {} parse: {} rows, {} skipped",
            self.source().name(),
            rows.len(),
            raws.len() - rows.len()
        );
        Ok(rows)
    }
}
