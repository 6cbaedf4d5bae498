use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::{ScrapeError, ScrapeResult};
use crate::models::Row;

/// Static translation from source-native key names to listing columns
#[derive(Debug, Clone)]
pub struct FieldMap {
    source_name: String,
    columns: HashMap<String, String>,
}

impl FieldMap {
    pub fn new(source_name: &str, columns: HashMap<String, String>) -> Self {
        Self {
            source_name: source_name.to_string(),
            columns,
        }
    }

    /// Load a `{"sourceKey": "column"}` JSON file; a missing file is fatal
    pub fn load(source_name: &str, path: &Path) -> ScrapeResult<Self> {
        let raw = fs::read_to_string(path).map_err(|source| ScrapeError::MappingFile {
            path: path.to_path_buf(),
            source,
        })?;
        let columns = serde_json::from_str(&raw).map_err(|source| ScrapeError::MappingFormat {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(source_name, columns))
    }

    /// Fail fast when any key the adapter can produce has no destination column
    pub fn validate<I, S>(&self, keys: I) -> ScrapeResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for key in keys {
            self.column_for(key.as_ref())?;
        }
        Ok(())
    }

    pub fn column_for(&self, key: &str) -> ScrapeResult<&str> {
        self.columns
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| ScrapeError::UnmappedField {
                field: key.to_string(),
                source_name: self.source_name.clone(),
            })
    }

    pub fn rename(&self, row: Row) -> ScrapeResult<Row> {
        let mut renamed = Row::new();
        for (key, value) in row {
            renamed.insert(self.column_for(&key)?.to_string(), value);
        }
        Ok(renamed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn sample() -> FieldMap {
        let columns = [("houseNumber", "house_number"), ("street", "street")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        FieldMap::new("Test", columns)
    }

    #[test]
    fn renames_every_key() {
        let mut row = Row::new();
        row.insert("houseNumber".into(), json!(12));
        row.insert("street".into(), json!("Voorstraat"));

        let renamed = sample().rename(row).unwrap();

        assert_eq!(
            serde_json::Value::Object(renamed),
            json!({"house_number": 12, "street": "Voorstraat"})
        );
    }

    #[test]
    fn unmapped_key_is_reported() {
        let mut row = Row::new();
        row.insert("mystery".into(), json!(1));

        let err = sample().rename(row).unwrap_err();

        assert!(matches!(err, ScrapeError::UnmappedField { field, .. } if field == "mystery"));
        assert!(sample().validate(["street", "mystery"]).is_err());
        assert!(sample().validate(["street", "houseNumber"]).is_ok());
    }

    #[test]
    fn load_reads_json_and_rejects_missing_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"ID": "domain_id"}}"#).unwrap();

        let map = FieldMap::load("Test", file.path()).unwrap();
        assert_eq!(map.column_for("ID").unwrap(), "domain_id");

        let err = FieldMap::load("Test", Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, ScrapeError::MappingFile { .. }));
    }
}
