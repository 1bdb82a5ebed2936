use bson::oid::ObjectId;
use bson::Document;
use serde::{Deserialize, Serialize};

/// Reference to one integration instance (a repository, a build job, a
/// deployment target, ...) collected by some external tool.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectorItem {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collector_id: Option<ObjectId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub enabled: bool,

    /// Milliseconds since the unix epoch.
    #[serde(default)]
    pub last_updated: i64,

    /// Tool specific attributes (job url, repo branch, ...).
    #[serde(default)]
    pub options: Document,
}

impl CollectorItem {
    pub fn new(id: ObjectId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn with_last_updated(mut self, last_updated: i64) -> Self {
        self.last_updated = last_updated;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_collector_id(mut self, collector_id: ObjectId) -> Self {
        self.collector_id = Some(collector_id);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<bson::Bson>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_stored_field_names() {
        let id = ObjectId::new();
        let item = CollectorItem::new(id)
            .with_last_updated(42)
            .with_enabled(true)
            .with_option("branch", "main");
        let doc = bson::to_document(&item).unwrap();
        assert_eq!(doc.get_object_id("_id").unwrap(), id);
        assert_eq!(doc.get_i64("lastUpdated").unwrap(), 42);
        assert!(doc.get_bool("enabled").unwrap());
        assert_eq!(
            doc.get_document("options").unwrap().get_str("branch").unwrap(),
            "main"
        );
        assert!(!doc.contains_key("collectorId"));
    }

    #[test]
    fn missing_fields_take_defaults() {
        let item: CollectorItem = bson::from_document(bson::doc! {}).unwrap();
        assert_eq!(item, CollectorItem::default());
    }
}
