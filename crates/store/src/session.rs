use crate::convert::ConversionSet;
use crate::persist::{
    component_to_document, id_filter, ItemResolver, StoredComponent, COLLECTOR_ITEMS, COMPONENTS,
};
use crate::StoreError;
use dashboard_component::{CollectorItem, Component};
use futures::TryStreamExt;
use mongodb::bson::{self, doc, oid::ObjectId, Bson, Document};
use mongodb::{Client, Collection, Database};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Accessor for all reads and writes against one database.
///
/// Every document read through the session passes through its
/// [`ConversionSet`] before it is deserialized. Cloning is cheap and shares
/// the underlying client.
#[derive(Clone)]
pub struct Session {
    client: Client,
    database: Database,
    conversions: Arc<ConversionSet>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("database", &self.database.name())
            .field("conversions", &self.conversions)
            .finish()
    }
}

impl Session {
    pub fn new(
        client: Client,
        database_name: impl Into<String>,
        conversions: ConversionSet,
    ) -> Self {
        let database_name = database_name.into();
        let database = client.database(&database_name);
        Self {
            client,
            database,
            conversions: Arc::new(conversions),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn database_name(&self) -> &str {
        self.database.name()
    }

    pub fn conversions(&self) -> &ConversionSet {
        &self.conversions
    }

    pub fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.database.collection(name)
    }

    /// Normalizes a raw document read from `collection` and deserializes it.
    pub fn read<T: DeserializeOwned>(
        &self,
        collection: &str,
        mut document: Document,
    ) -> Result<T, StoreError> {
        self.conversions.apply(collection, &mut document)?;
        Ok(bson::from_document(document)?)
    }

    pub async fn find_one<T: DeserializeOwned>(
        &self,
        collection: &str,
        filter: Document,
    ) -> Result<Option<T>, StoreError> {
        let document = self
            .collection::<Document>(collection)
            .find_one(filter)
            .await?;
        document
            .map(|document| self.read(collection, document))
            .transpose()
    }

    pub async fn find<T: DeserializeOwned>(
        &self,
        collection: &str,
        filter: Document,
    ) -> Result<Vec<T>, StoreError> {
        let documents: Vec<Document> = self
            .collection::<Document>(collection)
            .find(filter)
            .await?
            .try_collect()
            .await?;
        debug!(collection, count = documents.len(), "read documents");
        documents
            .into_iter()
            .map(|document| self.read(collection, document))
            .collect()
    }

    /// Inserts or replaces `document` by its `_id`, generating an object id
    /// when it has none. Returns the id.
    pub async fn save(&self, collection: &str, mut document: Document) -> Result<Bson, StoreError> {
        let id = match document.get("_id") {
            Some(id) => id.clone(),
            None => {
                let id = Bson::ObjectId(ObjectId::new());
                document.insert("_id", id.clone());
                id
            }
        };
        self.collection::<Document>(collection)
            .replace_one(id_filter(id.clone()), document)
            .upsert(true)
            .await?;
        Ok(id)
    }

    /// Serializes and saves `value`, see [`Session::save`].
    pub async fn save_value<T: Serialize>(
        &self,
        collection: &str,
        value: &T,
    ) -> Result<Bson, StoreError> {
        self.save(collection, bson::to_document(value)?).await
    }

    pub async fn remove(&self, collection: &str, id: impl Into<Bson>) -> Result<bool, StoreError> {
        let result = self
            .collection::<Document>(collection)
            .delete_one(id_filter(id))
            .await?;
        Ok(result.deleted_count > 0)
    }

    /// Saves `item` to the collector item collection, assigning an id if needed.
    pub async fn save_item(&self, item: &mut CollectorItem) -> Result<ObjectId, StoreError> {
        let id = *item.id.get_or_insert_with(ObjectId::new);
        self.save_value(COLLECTOR_ITEMS, &*item).await?;
        Ok(id)
    }

    /// Saves `component` with its items stored by reference, assigning an id if needed.
    ///
    /// The referenced items are not written; save them with [`Session::save_item`].
    pub async fn save_component(&self, component: &mut Component) -> Result<ObjectId, StoreError> {
        let id = component.id().unwrap_or_else(ObjectId::new);
        component.set_id(id);
        let document = component_to_document(component).map_err(|err| {
            warn!(
                component = component.name(),
                collector_type = %err.collector_type(),
                "refusing to save component: {}",
                err
            );
            err
        })?;
        self.save(COMPONENTS, document).await?;
        debug!(component = component.name(), %id, "saved component");
        Ok(id)
    }

    pub async fn load_component(&self, id: ObjectId) -> Result<Option<Component>, StoreError> {
        self.load_component_matching(id_filter(id)).await
    }

    pub async fn find_component_by_name(&self, name: &str) -> Result<Option<Component>, StoreError> {
        self.load_component_matching(doc! { "name": name }).await
    }

    async fn load_component_matching(
        &self,
        filter: Document,
    ) -> Result<Option<Component>, StoreError> {
        let Some(mut document) = self
            .collection::<Document>(COMPONENTS)
            .find_one(filter)
            .await?
        else {
            return Ok(None);
        };
        self.conversions.apply(COMPONENTS, &mut document)?;
        let stored = StoredComponent::from_document(document)?;
        Ok(Some(stored.resolve(self).await?))
    }

    /// Every stored component with its references resolved.
    pub async fn list_components(&self) -> Result<Vec<Component>, StoreError> {
        let documents: Vec<Document> = self
            .collection::<Document>(COMPONENTS)
            .find(doc! {})
            .await?
            .try_collect()
            .await?;
        let mut components = Vec::with_capacity(documents.len());
        for mut document in documents {
            self.conversions.apply(COMPONENTS, &mut document)?;
            let stored = StoredComponent::from_document(document)?;
            components.push(stored.resolve(self).await?);
        }
        Ok(components)
    }

    /// Closes the shared client. Other clones of the client stop working too.
    pub async fn shutdown(self) {
        info!(database = self.database_name(), "shutting down mongo client");
        self.client.shutdown().await;
    }
}

#[async_trait::async_trait]
impl ItemResolver for Session {
    async fn resolve(&self, ids: &[ObjectId]) -> Result<Vec<CollectorItem>, StoreError> {
        let ids: Vec<Bson> = ids.iter().copied().map(Bson::ObjectId).collect();
        self.find(COLLECTOR_ITEMS, doc! { "_id": { "$in": ids } })
            .await
    }
}
