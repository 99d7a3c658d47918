use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Attribute name → arbitrary JSON value for one record.
pub type AttributeMap = Map<String, Value>;

/// Parsed content of one fragment file: record name → attributes.
pub type Fragment = BTreeMap<String, AttributeMap>;

/// Union of every fragment in the registry directory.
pub type MergedView = BTreeMap<String, AttributeMap>;

/// Interface name carried by change notifications of the machines registry.
pub const MACHINES_INTERFACE: &str = "machines";

/// Property invalidated whenever the merged view may have changed.
pub const RECORDS_PROPERTY: &str = "records";

/// Shallow per-key merge of `attributes` into the entry for `record`.
///
/// Attributes already present are overwritten, everything else in the
/// fragment is left untouched.
pub fn merge_attributes(fragment: &mut Fragment, record: &str, attributes: AttributeMap) {
    fragment
        .entry(record.to_string())
        .or_default()
        .extend(attributes);
}

/// Arguments of the `update` method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub filename: String,
    pub record: String,
    #[serde(default)]
    pub attributes: AttributeMap,
}

impl UpdateRequest {
    pub fn new(
        filename: impl Into<String>,
        record: impl Into<String>,
        attributes: AttributeMap,
    ) -> Self {
        Self {
            filename: filename.into(),
            record: record.into(),
            attributes,
        }
    }
}

/// Property-changed signal. Observers must re-read the invalidated
/// properties; no record data travels with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotification {
    pub interface: String,
    pub invalidated: Vec<String>,
    pub serial: u64,
}

impl ChangeNotification {
    pub fn records_changed(serial: u64) -> Self {
        Self {
            interface: MACHINES_INTERFACE.to_string(),
            invalidated: vec![RECORDS_PROPERTY.to_string()],
            serial,
        }
    }
}
