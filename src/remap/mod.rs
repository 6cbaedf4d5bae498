//! Flattening of nested API payloads into flat rows.
//!
//! A [`KeySpec`] names the values to lift out of a record: plain top-level
//! leaves, and key paths that descend into nested objects. A path such as
//! `["corporation", "name"]` yields a column called `corporation_name`.

pub mod field_map;

pub use field_map::FieldMap;

use serde_json::Value;

use crate::error::{ScrapeError, ScrapeResult};
use crate::models::Row;

/// Reference to a value inside a raw record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRef {
    Leaf(String),
    Path(Vec<String>),
}

impl FieldRef {
    /// Column name this reference produces in the flattened row
    pub fn output_key(&self) -> String {
        match self {
            FieldRef::Leaf(name) => name.clone(),
            FieldRef::Path(segments) => match segments.as_slice() {
                [] => String::new(),
                [only] => only.clone(),
                [.., parent, leaf] => format!("{parent}_{leaf}"),
            },
        }
    }

    /// Whether every segment of this reference exists in `record`
    pub fn resolves_in(&self, record: &Value) -> bool {
        match self {
            FieldRef::Leaf(name) => record.get(name).is_some(),
            FieldRef::Path(segments) => {
                let mut current = record;
                for segment in segments {
                    match current.get(segment) {
                        Some(next) => current = next,
                        None => return false,
                    }
                }
                !segments.is_empty()
            }
        }
    }
}

/// The set of leaves and key paths to extract from a record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySpec {
    fields: Vec<FieldRef>,
}

impl KeySpec {
    pub fn new(leaves: &[&str], paths: &[&[&str]]) -> Self {
        let mut fields: Vec<FieldRef> = leaves
            .iter()
            .map(|leaf| FieldRef::Leaf(leaf.to_string()))
            .collect();
        fields.extend(
            paths
                .iter()
                .map(|path| FieldRef::Path(path.iter().map(|s| s.to_string()).collect())),
        );
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldRef] {
        &self.fields
    }

    pub fn contains_leaf(&self, name: &str) -> bool {
        self.fields
            .iter()
            .any(|f| matches!(f, FieldRef::Leaf(leaf) if leaf == name))
    }

    pub fn remove_leaf(&mut self, name: &str) {
        self.fields
            .retain(|f| !matches!(f, FieldRef::Leaf(leaf) if leaf == name));
    }

    pub fn push_leaf(&mut self, name: &str) {
        self.fields.push(FieldRef::Leaf(name.to_string()));
    }

    /// Copy of this spec without the references `record` cannot satisfy
    pub fn resolvable_in(&self, record: &Value) -> KeySpec {
        KeySpec {
            fields: self
                .fields
                .iter()
                .filter(|f| f.resolves_in(record))
                .cloned()
                .collect(),
        }
    }

    pub fn output_keys(&self) -> Vec<String> {
        self.fields.iter().map(FieldRef::output_key).collect()
    }
}

/// Flatten `record` according to `spec`.
///
/// Leaves are extracted first and key paths second, so a path result wins
/// over a leaf of the same name. Any referenced key that is absent fails the
/// whole record with [`ScrapeError::KeyNotFound`].
pub fn extract(record: &Value, spec: &KeySpec) -> ScrapeResult<Row> {
    let mut row = Row::new();

    for field in spec.fields.iter() {
        if let FieldRef::Leaf(name) = field {
            row.insert(name.clone(), lookup(record, name)?.clone());
        }
    }

    for field in spec.fields.iter() {
        if let FieldRef::Path(segments) = field {
            row.extend(extract_path(record, segments)?);
        }
    }

    Ok(row)
}

fn extract_path(record: &Value, path: &[String]) -> ScrapeResult<Row> {
    let Some((head, rest)) = path.split_first() else {
        return Ok(Row::new());
    };
    let child = lookup(record, head)?;

    match rest {
        [] => {
            let mut row = Row::new();
            row.insert(head.clone(), child.clone());
            Ok(row)
        }
        [leaf] => {
            let mut row = Row::new();
            row.insert(format!("{head}_{leaf}"), lookup(child, leaf)?.clone());
            Ok(row)
        }
        _ => extract_path(child, rest),
    }
}

fn lookup<'a>(record: &'a Value, key: &str) -> ScrapeResult<&'a Value> {
    record.get(key).ok_or_else(|| ScrapeError::KeyNotFound {
        key: key.to_string(),
    })
}

/// Collapse a list-valued attribute into one delimited string.
///
/// Items may be plain strings or objects carrying `item_field`; anything else
/// is skipped. Non-list values are left alone.
pub fn join_multi_valued(row: &mut Row, key: &str, item_field: &str, separator: &str) {
    let Some(Value::Array(items)) = row.get(key) else {
        return;
    };
    let joined = items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.as_str()),
            Value::Object(map) => map.get(item_field).and_then(Value::as_str),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(separator);
    row.insert(key.to_string(), Value::String(joined));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn top_level_leaves_pass_through() {
        let record = json!({"street": "Voorstraat", "houseNumber": 12, "ignored": true});
        let spec = KeySpec::new(&["street", "houseNumber"], &[]);

        let row = extract(&record, &spec).unwrap();

        assert_eq!(
            Value::Object(row),
            json!({"street": "Voorstraat", "houseNumber": 12})
        );
    }

    #[test]
    fn nested_path_is_named_after_parent_and_leaf() {
        let record = json!({"corporation": {"name": "ACME", "id": 4}});
        let spec = KeySpec::new(&[], &[&["corporation", "name"]]);

        let row = extract(&record, &spec).unwrap();

        assert_eq!(Value::Object(row), json!({"corporation_name": "ACME"}));
    }

    #[test]
    fn two_segment_path_matches_direct_lookup() {
        let record = json!({
            "kitchen": {"localizedName": "Open kitchen"},
            "floor": {"verdieping": 3}
        });
        for (parent, leaf) in [("kitchen", "localizedName"), ("floor", "verdieping")] {
            let spec = KeySpec::new(&[], &[&[parent, leaf]]);
            let row = extract(&record, &spec).unwrap();
            assert_eq!(row.len(), 1);
            assert_eq!(row[&format!("{parent}_{leaf}")], record[parent][leaf]);
        }
    }

    #[test]
    fn deep_path_keeps_innermost_parent_in_name() {
        let record = json!({"a": {"b": {"c": "deep"}}});
        let spec = KeySpec::new(&[], &[&["a", "b", "c"]]);

        let row = extract(&record, &spec).unwrap();

        assert_eq!(Value::Object(row), json!({"b_c": "deep"}));
        assert_eq!(spec.output_keys(), vec!["b_c".to_string()]);
    }

    #[test]
    fn single_segment_path_returns_raw_subobject() {
        let record = json!({"quarter": {"name": "Centrum", "id": 7}});
        let spec = KeySpec::new(&[], &[&["quarter"]]);

        let row = extract(&record, &spec).unwrap();

        assert_eq!(row["quarter"], json!({"name": "Centrum", "id": 7}));
    }

    #[test]
    fn missing_leaf_fails_without_partial_row() {
        let record = json!({"street": "Voorstraat"});
        let spec = KeySpec::new(&["street", "houseNumber"], &[]);

        let err = extract(&record, &spec).unwrap_err();

        assert!(matches!(err, ScrapeError::KeyNotFound { key } if key == "houseNumber"));
    }

    #[test]
    fn missing_nested_key_fails() {
        let record = json!({"corporation": null});
        let spec = KeySpec::new(&[], &[&["corporation", "name"]]);

        let err = extract(&record, &spec).unwrap_err();

        assert!(matches!(err, ScrapeError::KeyNotFound { key } if key == "name"));
    }

    #[test]
    fn path_results_win_over_leaves_on_collision() {
        let record = json!({"a_b": "leaf", "a": {"b": "path"}});
        let spec = KeySpec::new(&["a_b"], &[&["a", "b"]]);

        let row = extract(&record, &spec).unwrap();

        assert_eq!(row["a_b"], json!("path"));
    }

    #[test]
    fn resolvable_in_drops_unreachable_references() {
        let record = json!({"street": "X", "quarter": null, "kitchen": {"localizedName": "K"}});
        let spec = KeySpec::new(
            &["street", "houseNumber"],
            &[&["quarter", "name"], &["kitchen", "localizedName"]],
        );

        let pruned = spec.resolvable_in(&record);

        assert_eq!(
            pruned.output_keys(),
            vec!["street".to_string(), "kitchen_localizedName".to_string()]
        );
        assert!(extract(&record, &pruned).is_ok());
    }

    #[test]
    fn amenity_lists_are_joined() {
        let mut row = Row::new();
        row.insert(
            "specifiekeVoorzieningen".into(),
            json!([{"localizedName": "Balcony"}, {"localizedName": "Elevator"}, {"other": 1}]),
        );
        row.insert("tags".into(), json!(["a", "b"]));
        row.insert("plain".into(), json!("untouched"));

        join_multi_valued(&mut row, "specifiekeVoorzieningen", "localizedName", ", ");
        join_multi_valued(&mut row, "tags", "localizedName", ", ");
        join_multi_valued(&mut row, "plain", "localizedName", ", ");

        assert_eq!(row["specifiekeVoorzieningen"], json!("Balcony, Elevator"));
        assert_eq!(row["tags"], json!("a, b"));
        assert_eq!(row["plain"], json!("untouched"));
    }
}
