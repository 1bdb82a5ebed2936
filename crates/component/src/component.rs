use crate::{CollectorItem, CollectorType, ComponentError};
use bson::oid::ObjectId;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Collector items of a component, grouped by type in insertion order.
pub type CollectorItems = BTreeMap<CollectorType, Arc<Vec<CollectorItem>>>;

/// A self-contained, independently deployable piece of a larger application.
///
/// Each component of an application has its own source repository, build job,
/// deployment job and so on; those integrations are tracked as collector items
/// grouped by [`CollectorType`].
///
/// Category lists are shared immutable snapshots: writers build a new list
/// and swap it in, so a [`Component::snapshot`] held by a reader never changes
/// underneath it. Mutation requires `&mut self`; a component shared between
/// tasks must sit behind the caller's lock.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Component {
    id: Option<ObjectId>,
    // must be unique to the application
    name: String,
    owner: Option<String>,
    collector_items: CollectorItems,
}

impl Component {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: ObjectId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn id(&self) -> Option<ObjectId> {
        self.id
    }

    pub fn set_id(&mut self, id: ObjectId) {
        self.id = Some(id);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn set_owner(&mut self, owner: Option<String>) {
        self.owner = owner;
    }

    pub fn collector_items(&self) -> &CollectorItems {
        &self.collector_items
    }

    /// Types that currently have at least one item.
    pub fn collector_types(&self) -> impl Iterator<Item = CollectorType> + '_ {
        self.collector_items
            .iter()
            .filter(|(_, items)| !items.is_empty())
            .map(|(ty, _)| *ty)
    }

    /// Items registered for `collector_type`, empty if there are none.
    pub fn items(&self, collector_type: CollectorType) -> &[CollectorItem] {
        self.collector_items
            .get(&collector_type)
            .map(|items| items.as_slice())
            .unwrap_or(&[])
    }

    /// Shared snapshot of the items for `collector_type`.
    ///
    /// Later writes to the component never affect a snapshot already handed out.
    pub fn snapshot(&self, collector_type: CollectorType) -> Arc<Vec<CollectorItem>> {
        self.collector_items
            .get(&collector_type)
            .cloned()
            .unwrap_or_default()
    }

    /// Replaces every collector item of the component. Contents are taken as is.
    pub fn set_all_items(
        &mut self,
        replacement: impl IntoIterator<Item = (CollectorType, Vec<CollectorItem>)>,
    ) {
        self.collector_items = replacement
            .into_iter()
            .map(|(ty, items)| (ty, Arc::new(items)))
            .collect();
    }

    /// Adds `item` unless an item with the same id is already registered for
    /// `collector_type`. Adding a known id is a no-op and keeps the original item.
    pub fn add_item(
        &mut self,
        collector_type: CollectorType,
        item: CollectorItem,
    ) -> Result<(), ComponentError> {
        let id = require_id(collector_type, &item)?;
        match self.collector_items.get_mut(&collector_type) {
            None => {
                self.collector_items
                    .insert(collector_type, Arc::new(vec![item]));
            }
            Some(existing) => {
                if contains_id(existing, id) {
                    tracing::trace!(%collector_type, %id, "collector item already registered");
                    return Ok(());
                }
                let mut items = Vec::with_capacity(existing.len() + 1);
                items.extend(existing.iter().cloned());
                items.push(item);
                *existing = Arc::new(items);
            }
        }
        Ok(())
    }

    /// Copies the `last_updated` timestamp of `item` onto the registered item
    /// with the same id, leaving every other field and the order untouched.
    ///
    /// Returns `Ok(false)` when no registered item has that id.
    ///
    /// # Errors
    /// - [`ComponentError::Validation`] if `item` has no id.
    /// - [`ComponentError::NotFound`] if the component has no items of `collector_type`.
    pub fn update_item(
        &mut self,
        collector_type: CollectorType,
        item: &CollectorItem,
    ) -> Result<bool, ComponentError> {
        let id = require_id(collector_type, item)?;
        let existing = match self.collector_items.get_mut(&collector_type) {
            Some(existing) if !existing.is_empty() => existing,
            _ => return Err(ComponentError::NotFound { collector_type }),
        };
        let Some(position) = existing.iter().position(|e| e.id == Some(id)) else {
            return Ok(false);
        };
        // clones the list first if a snapshot of it is still held elsewhere
        Arc::make_mut(existing)[position].last_updated = item.last_updated;
        Ok(true)
    }

    pub fn first_item(&self, collector_type: CollectorType) -> Option<&CollectorItem> {
        self.items(collector_type).first()
    }

    /// First item (in insertion order) whose id is one of `ids`.
    pub fn item_matching_any(
        &self,
        collector_type: CollectorType,
        ids: &[ObjectId],
    ) -> Option<&CollectorItem> {
        self.items(collector_type)
            .iter()
            .find(|item| item.id.is_some_and(|id| ids.contains(&id)))
    }

    /// Item with the greatest `last_updated`; ties go to the earliest inserted.
    pub fn most_recently_updated_item(
        &self,
        collector_type: CollectorType,
    ) -> Option<&CollectorItem> {
        self.items(collector_type).iter().reduce(|latest, item| {
            if item.last_updated > latest.last_updated {
                item
            } else {
                latest
            }
        })
    }
}

fn require_id(
    collector_type: CollectorType,
    item: &CollectorItem,
) -> Result<ObjectId, ComponentError> {
    item.id.ok_or_else(|| ComponentError::Validation {
        collector_type,
        reason: "collector item has no id".to_string(),
    })
}

fn contains_id(items: &[CollectorItem], id: ObjectId) -> bool {
    items.iter().any(|item| item.id == Some(id))
}
