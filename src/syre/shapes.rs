//! Shape classification for documents that changed layout between versions.
//!
//! Converters decode a field into one of these variants first and only then
//! decide whether to rewrite it.

use crate::error::{MigrationError, MigrationResult};
use serde_json::{Map, Value};
use std::path::Path;

/// A path field: plain string (0.10.1+) or `{"Relative": "..."}` (0.10.0).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathShape {
    Plain(String),
    Relative(String),
}

impl PathShape {
    /// `doc` names the document being decoded, `owner` the record holding
    /// the path (used in error messages only).
    pub fn decode(value: &Value, doc: &Path, owner: &str) -> MigrationResult<Self> {
        match value {
            Value::String(path) => Ok(Self::Plain(path.clone())),
            Value::Object(tagged) => match (tagged.len(), tagged.get("Relative")) {
                (1, Some(Value::String(path))) => Ok(Self::Relative(path.clone())),
                _ => Err(MigrationError::corrupt(
                    doc,
                    format!("invalid path for {owner}: only `Relative` paths are supported, found {value}"),
                )),
            },
            other => Err(MigrationError::malformed(
                doc,
                format!("invalid path for {owner}: {other}"),
            )),
        }
    }
}

/// Rewrite a tagged path field in place. Returns whether anything changed.
pub fn unwrap_relative_path(
    record: &mut Map<String, Value>,
    doc: &Path,
    owner: &str,
) -> MigrationResult<bool> {
    let Some(value) = record.get("path") else {
        return Err(MigrationError::malformed(doc, format!("{owner} has no path")));
    };
    match PathShape::decode(value, doc, owner)? {
        PathShape::Plain(_) => Ok(false),
        PathShape::Relative(path) => {
            record.insert("path".to_string(), Value::String(path));
            Ok(true)
        }
    }
}

/// A list of records stored either as a list or as a map keyed by id.
pub enum RecordsShape<'a> {
    Map(&'a mut Map<String, Value>),
    List(&'a mut Vec<Value>),
}

impl<'a> RecordsShape<'a> {
    pub fn decode(value: &'a mut Value, doc: &Path) -> MigrationResult<Self> {
        match value {
            Value::Object(map) => Ok(Self::Map(map)),
            Value::Array(list) => Ok(Self::List(list)),
            other => Err(MigrationError::malformed(
                doc,
                format!("expected a list or map of records, found {other}"),
            )),
        }
    }

    pub fn records_mut(self) -> Vec<&'a mut Value> {
        match self {
            Self::Map(map) => map.values_mut().collect(),
            Self::List(list) => list.iter_mut().collect(),
        }
    }
}

/// Where a record keeps its analysis associations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationsShape {
    /// Neither `scripts` nor `analyses` present.
    Missing,
    /// Pre-0.10.2 `scripts` field.
    Scripts,
    /// 0.10.2 `analyses` map keyed by analysis id.
    Map,
    /// 0.11 `analyses` list of `{analysis, autorun, priority}`.
    List,
}

impl AssociationsShape {
    pub fn decode(container: &Map<String, Value>, doc: &Path) -> MigrationResult<Self> {
        match (container.get("analyses"), container.get("scripts")) {
            (Some(Value::Object(_)), _) => Ok(Self::Map),
            (Some(Value::Array(_)), _) => Ok(Self::List),
            (Some(other), _) => Err(MigrationError::malformed(
                doc,
                format!("invalid analyses field: {other}"),
            )),
            (None, Some(_)) => Ok(Self::Scripts),
            (None, None) => Ok(Self::Missing),
        }
    }
}

/// Placement of `creator`/`created` between a properties document and its
/// settings document.
#[derive(Debug, Clone, PartialEq)]
pub enum CreatorPlacement {
    /// Both fields in the properties document, neither in settings.
    InProperties { creator: Value, created: Value },
    /// Neither in properties, both in settings.
    InSettings,
}

impl CreatorPlacement {
    pub fn decode(
        properties: &Map<String, Value>,
        settings: &Map<String, Value>,
        at: &Path,
    ) -> MigrationResult<Self> {
        let src = (properties.get("creator"), properties.get("created"));
        let dst = (
            settings.contains_key("creator"),
            settings.contains_key("created"),
        );
        match (src, dst) {
            ((Some(creator), Some(created)), (false, false)) => Ok(Self::InProperties {
                creator: creator.clone(),
                created: created.clone(),
            }),
            ((None, None), (true, true)) => Ok(Self::InSettings),
            _ => Err(MigrationError::corrupt(
                at,
                format!(
                    "creator/created partially migrated (properties: creator={}, created={}; settings: creator={}, created={})",
                    src.0.is_some(),
                    src.1.is_some(),
                    dst.0,
                    dst.1
                ),
            )),
        }
    }
}

/// Permission table in a settings document.
pub enum PermissionsShape {
    Missing,
    Map,
    /// Pre-0.11 list of `{user, ...}` records.
    List(Vec<Value>),
}

impl PermissionsShape {
    pub fn decode(settings: &Map<String, Value>, doc: &Path) -> MigrationResult<Self> {
        match settings.get("permissions") {
            None | Some(Value::Null) => Ok(Self::Missing),
            Some(Value::Object(_)) => Ok(Self::Map),
            Some(Value::Array(list)) => Ok(Self::List(list.clone())),
            Some(other) => Err(MigrationError::malformed(
                doc,
                format!("invalid permissions: {other}"),
            )),
        }
    }
}

/// Borrow a document's root as an object.
pub fn as_object_mut<'a>(
    value: &'a mut Value,
    doc: &Path,
) -> MigrationResult<&'a mut Map<String, Value>> {
    value
        .as_object_mut()
        .ok_or_else(|| MigrationError::malformed(doc, "expected a JSON object"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn relative_tag_is_unwrapped() {
        let doc = Path::new("assets.json");
        let mut record = json!({"path": {"Relative": "x/y"}});
        let map = record.as_object_mut().expect("object");
        assert!(unwrap_relative_path(map, doc, "asset").expect("unwrap"));
        assert_eq!(record, json!({"path": "x/y"}));
    }

    #[test]
    fn plain_path_is_left_alone() {
        let doc = Path::new("assets.json");
        let mut record = json!({"path": "x/y"});
        let map = record.as_object_mut().expect("object");
        assert!(!unwrap_relative_path(map, doc, "asset").expect("unwrap"));
    }

    #[test]
    fn other_path_tag_is_fatal() {
        let doc = Path::new("assets.json");
        let err = PathShape::decode(&json!({"Absolute": "/x"}), doc, "asset").expect_err("tag");
        assert!(matches!(err, MigrationError::Corrupt { .. }));
    }

    #[test]
    fn creator_placement_three_way_guard() {
        let at = Path::new("container");
        let props = json!({"creator": null, "created": "t"});
        let empty = json!({});
        let settings = json!({"creator": null, "created": "t"});
        let p = |v: &Value| v.as_object().expect("object").clone();

        assert!(matches!(
            CreatorPlacement::decode(&p(&props), &p(&empty), at),
            Ok(CreatorPlacement::InProperties { .. })
        ));
        assert_eq!(
            CreatorPlacement::decode(&p(&empty), &p(&settings), at).expect("done"),
            CreatorPlacement::InSettings
        );
        assert!(matches!(
            CreatorPlacement::decode(&p(&props), &p(&settings), at),
            Err(MigrationError::Corrupt { .. })
        ));
        assert!(matches!(
            CreatorPlacement::decode(&p(&json!({"creator": null})), &p(&empty), at),
            Err(MigrationError::Corrupt { .. })
        ));
    }

    #[test]
    fn associations_shape_follows_fields() {
        let doc = Path::new("container.json");
        let decode = |v: Value| {
            AssociationsShape::decode(v.as_object().expect("object"), doc).expect("decode")
        };
        assert_eq!(decode(json!({})), AssociationsShape::Missing);
        assert_eq!(decode(json!({"scripts": {}})), AssociationsShape::Scripts);
        assert_eq!(decode(json!({"analyses": {}})), AssociationsShape::Map);
        assert_eq!(decode(json!({"analyses": []})), AssociationsShape::List);
    }
}
