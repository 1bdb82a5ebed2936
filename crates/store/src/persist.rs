//! Stored shape of components.
//!
//! A component is stored under [`COMPONENTS`] as
//! `{ _id, name, owner, collectorItems: { <type>: [<item id>, ..] } }`.
//! The items themselves live in [`COLLECTOR_ITEMS`] and are resolved on load.
//! References written as `{ "$ref": .., "$id": <item id> }` are read as well.

use crate::doc::{self, BsonKey};
use crate::StoreError;
use dashboard_component::{CollectorItem, CollectorType, Component, ComponentError};
use mongodb::bson::{self, doc, oid::ObjectId, Bson, Document};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use tracing::{trace, warn};

pub const COMPONENTS: &str = "components";
pub const COLLECTOR_ITEMS: &str = "collector_items";

/// Looks up collector items by id.
#[async_trait::async_trait]
pub trait ItemResolver: Send + Sync {
    /// Items for the given ids, in any order. Unknown ids are left out.
    async fn resolve(&self, ids: &[ObjectId]) -> Result<Vec<CollectorItem>, StoreError>;
}

/// Stored shape of `component`.
///
/// Fails with [`ComponentError::Validation`] if an item has no id, since
/// it could not be referenced.
pub fn component_to_document(component: &Component) -> Result<Document, ComponentError> {
    let mut collector_items = Document::new();
    for (collector_type, items) in component.collector_items() {
        if items.is_empty() {
            continue;
        }
        let ids = items
            .iter()
            .map(|item| {
                item.id
                    .map(Bson::ObjectId)
                    .ok_or_else(|| ComponentError::Validation {
                        collector_type: *collector_type,
                        reason: "collector item has no id".to_string(),
                    })
            })
            .collect::<Result<Vec<Bson>, _>>()?;
        collector_items.insert(collector_type.as_ref(), ids);
    }

    let mut document = Document::new();
    if let Some(id) = component.id() {
        document.insert("_id", id);
    }
    document.insert("name", component.name());
    if let Some(owner) = component.owner() {
        document.insert("owner", owner);
    }
    document.insert("collectorItems", collector_items);
    Ok(document)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawComponent {
    #[serde(rename = "_id", default)]
    id: Option<ObjectId>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    owner: Option<String>,
    #[serde(default)]
    collector_items: BTreeMap<String, Bson>,
}

/// A component as read from the store, with its items still unresolved.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredComponent {
    pub id: Option<ObjectId>,
    pub name: String,
    pub owner: Option<String>,
    pub references: BTreeMap<CollectorType, Vec<ObjectId>>,
}

impl StoredComponent {
    /// Parses a stored component. Unknown collector types and malformed
    /// references are skipped with a warning.
    pub fn from_document(document: Document) -> Result<Self, StoreError> {
        let raw: RawComponent = bson::from_document(document)?;
        let mut references = BTreeMap::new();
        for (key, entries) in raw.collector_items {
            let collector_type = match CollectorType::from_str(&key) {
                Ok(collector_type) => collector_type,
                Err(_) => {
                    warn!(component = %raw.name, collector_type = %key, "skipping unknown collector type");
                    continue;
                }
            };
            let Bson::Array(entries) = entries else {
                warn!(component = %raw.name, %collector_type, "skipping collector items that are not a list");
                continue;
            };
            let ids = entries
                .iter()
                .filter_map(|entry| match reference_id(entry) {
                    Ok(id) => Some(id),
                    Err(err) => {
                        warn!(component = %raw.name, %collector_type, "skipping reference: {}", err);
                        if let Some(partial_match) = err.partial_match() {
                            trace!("[{}] = {:#}", partial_match.path, partial_match.value);
                        }
                        None
                    }
                })
                .collect();
            references.insert(collector_type, ids);
        }
        Ok(Self {
            id: raw.id,
            name: raw.name,
            owner: raw.owner,
            references,
        })
    }

    /// Distinct referenced item ids.
    pub fn item_ids(&self) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = self.references.values().flatten().copied().collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Resolves every reference through `resolver`, keeping stored order.
    /// References to items that no longer exist are dropped.
    pub async fn resolve(self, resolver: &dyn ItemResolver) -> Result<Component, StoreError> {
        let ids = self.item_ids();
        let items: HashMap<ObjectId, CollectorItem> = if ids.is_empty() {
            HashMap::new()
        } else {
            resolver
                .resolve(&ids)
                .await?
                .into_iter()
                .filter_map(|item| item.id.map(|id| (id, item)))
                .collect()
        };

        let mut component = Component::new(self.name);
        if let Some(id) = self.id {
            component.set_id(id);
        }
        component.set_owner(self.owner);
        for (collector_type, ids) in self.references {
            for id in ids {
                match items.get(&id) {
                    Some(item) => component.add_item(collector_type, item.clone())?,
                    None => warn!(
                        component = component.name(),
                        %collector_type,
                        %id,
                        "dropping reference to missing collector item"
                    ),
                }
            }
        }
        Ok(component)
    }
}

fn reference_id(entry: &Bson) -> Result<ObjectId, doc::Error> {
    match entry {
        Bson::ObjectId(id) => Ok(*id),
        other => doc::get_object_id(other, &[BsonKey::from("$id")]),
    }
}

pub fn id_filter(id: impl Into<Bson>) -> Document {
    doc! { "_id": id.into() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct MemoryItems {
        items: Vec<CollectorItem>,
        requests: Mutex<Vec<Vec<ObjectId>>>,
    }

    #[async_trait::async_trait]
    impl ItemResolver for MemoryItems {
        async fn resolve(&self, ids: &[ObjectId]) -> Result<Vec<CollectorItem>, StoreError> {
            self.requests.lock().unwrap().push(ids.to_vec());
            // reverse to make sure callers do not rely on resolver order
            Ok(self
                .items
                .iter()
                .rev()
                .filter(|item| item.id.is_some_and(|id| ids.contains(&id)))
                .cloned()
                .collect())
        }
    }

    fn item(last_updated: i64) -> CollectorItem {
        CollectorItem::new(ObjectId::new()).with_last_updated(last_updated)
    }

    #[test]
    fn stores_items_by_reference() {
        let (a, b) = (item(1), item(2));
        let id = ObjectId::new();
        let mut component = Component::new("api").with_id(id).with_owner("team-a");
        component.add_item(CollectorType::Scm, a.clone()).unwrap();
        component.add_item(CollectorType::Scm, b.clone()).unwrap();

        assert_eq!(
            component_to_document(&component).unwrap(),
            doc! {
                "_id": id,
                "name": "api",
                "owner": "team-a",
                "collectorItems": { "SCM": [a.id.unwrap(), b.id.unwrap()] },
            }
        );
    }

    #[test]
    fn parses_plain_and_db_ref_references() {
        let (a, b) = (ObjectId::new(), ObjectId::new());
        let document = doc! {
            "name": "api",
            "collectorItems": {
                "Build": [a, { "$ref": "collector_items", "$id": b }, "not-an-id"],
                "Unknown": [a],
                "Incident": "x",
                "Deployment": null,
            },
        };
        let stored = StoredComponent::from_document(document).unwrap();
        assert_eq!(stored.id, None);
        assert_eq!(stored.owner, None);
        assert_eq!(
            stored.references,
            BTreeMap::from([(CollectorType::Build, vec![a, b])])
        );
    }

    #[test]
    fn items_without_id_cannot_be_stored() {
        let mut component = Component::new("api");
        component.set_all_items([(
            CollectorType::Build,
            vec![item(1), CollectorItem::default().with_last_updated(2)],
        )]);
        assert_eq!(
            component_to_document(&component),
            Err(ComponentError::Validation {
                collector_type: CollectorType::Build,
                reason: "collector item has no id".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn resolves_in_stored_order_and_drops_dangling_references() {
        let (a, b, c) = (item(10), item(30), item(20));
        let missing = ObjectId::new();
        let resolver = MemoryItems {
            items: vec![a.clone(), b.clone(), c.clone()],
            ..MemoryItems::default()
        };

        let id = ObjectId::new();
        let document = doc! {
            "_id": id,
            "name": "api",
            "owner": "team-a",
            "collectorItems": {
                "Build": [c.id.unwrap(), missing, a.id.unwrap(), c.id.unwrap()],
                "Deployment": [b.id.unwrap()],
            },
        };
        let component = StoredComponent::from_document(document)
            .unwrap()
            .resolve(&resolver)
            .await
            .unwrap();

        assert_eq!(component.id(), Some(id));
        assert_eq!(component.owner(), Some("team-a"));
        assert_eq!(component.items(CollectorType::Build), &[c, a][..]);
        assert_eq!(component.items(CollectorType::Deployment), &[b][..]);
        assert_eq!(resolver.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn round_trips_through_stored_shape() {
        let (a, b) = (item(1), item(2));
        let resolver = MemoryItems {
            items: vec![a.clone(), b.clone()],
            ..MemoryItems::default()
        };
        let mut component = Component::new("api").with_id(ObjectId::new());
        component.add_item(CollectorType::Test, b).unwrap();
        component.add_item(CollectorType::Test, a).unwrap();

        let restored = StoredComponent::from_document(component_to_document(&component).unwrap())
            .unwrap()
            .resolve(&resolver)
            .await
            .unwrap();
        assert_eq!(restored, component);
    }

    #[tokio::test]
    async fn skips_resolver_without_references() {
        let resolver = MemoryItems::default();
        let component = StoredComponent::from_document(doc! { "name": "empty" })
            .unwrap()
            .resolve(&resolver)
            .await
            .unwrap();
        assert_eq!(component, Component::new("empty"));
        assert!(resolver.requests.lock().unwrap().is_empty());
    }
}
