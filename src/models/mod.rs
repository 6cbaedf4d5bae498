use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Timestamp layout used for every date-like column
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Flat mapping from column name to scalar value, ready for upsert
pub type Row = Map<String, Value>;

/// Source of the rental listing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Room,
    Kamernet,
    Pararius,
    Funda,
}

impl Source {
    pub const ALL: [Source; 4] = [Source::Room, Source::Kamernet, Source::Pararius, Source::Funda];

    pub fn name(&self) -> &'static str {
        match self {
            Source::Room => "Room",
            Source::Kamernet => "Kamernet",
            Source::Pararius => "Pararius",
            Source::Funda => "Funda",
        }
    }

    /// Base domain stored in the `domain` column
    pub fn domain(&self) -> &'static str {
        match self {
            Source::Room => "https://www.room.nl",
            Source::Kamernet => "https://kamernet.nl",
            Source::Pararius => "https://www.pararius.com",
            Source::Funda => "https://www.funda.nl",
        }
    }
}

/// One undigested listing as handed over by discovery
#[derive(Debug, Clone, PartialEq)]
pub enum RawRecord {
    /// A listing object returned by a JSON API
    Json(Value),
    /// A detail-page link collected from a rendered search page
    Link(String),
}

/// Per-run state threaded through the pipeline instead of module globals
#[derive(Debug, Clone)]
pub struct RunContext {
    pub upload_date: NaiveDateTime,
}

impl RunContext {
    /// Batch timestamp is truncated to the minute
    pub fn new(now: NaiveDateTime) -> Self {
        let upload_date = now
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(now);
        Self { upload_date }
    }

    pub fn upload_date_value(&self) -> Value {
        Value::String(self.upload_date.format(DATETIME_FORMAT).to_string())
    }

    pub fn stamp(&self, rows: &mut [Row]) {
        for row in rows.iter_mut() {
            row.insert("upload_date".to_string(), self.upload_date_value());
        }
    }
}

/// Mail log entry, written through the same upsert path as listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub sent_url_append: String,
    pub sender: String,
    pub recipient: String,
    pub send_date: NaiveDateTime,
    pub sent_data_upload_date: NaiveDateTime,
}

impl Message {
    pub fn to_row(&self) -> Row {
        let mut row = Row::new();
        row.insert("sent_url_append".into(), Value::from(self.sent_url_append.clone()));
        row.insert("sender".into(), Value::from(self.sender.clone()));
        row.insert("recipient".into(), Value::from(self.recipient.clone()));
        row.insert(
            "send_date".into(),
            Value::from(self.send_date.format(DATETIME_FORMAT).to_string()),
        );
        row.insert(
            "sent_data_upload_date".into(),
            Value::from(self.sent_data_upload_date.format(DATETIME_FORMAT).to_string()),
        );
        row
    }
}
