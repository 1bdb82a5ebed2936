//! Read side value conversions.
//!
//! Documents read through a [`crate::Session`] pass through the converters
//! of a [`ConversionSet`] registered for their collection before they are
//! deserialized, so fields that were stored with several legacy encodings
//! reach the model in one canonical form.

use crate::doc::{self, BsonKey, BsonValue, InvalidTypeError};
use mongodb::bson::{Bson, Document};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::trace;

lazy_static::lazy_static! {
    static ref TRUTHY: HashSet<&'static str> =
        HashSet::from(["true", "1", "yes", "y", "on", "active", "enabled"]);
    static ref FALSY: HashSet<&'static str> =
        HashSet::from(["false", "0", "no", "n", "off", "inactive", "disabled", ""]);
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("{converter} cannot convert field {field:?}: {source}")]
pub struct ConversionError {
    pub converter: &'static str,
    pub field: String,
    #[source]
    pub source: InvalidTypeError,
}

/// Converts one stored representation of a field into its canonical form.
pub trait ReadConverter: std::fmt::Debug + Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Dotted paths of the fields this converter normalizes.
    fn fields(&self) -> &[String];

    fn convert(&self, value: &Bson) -> Result<Bson, InvalidTypeError>;
}

/// Normalizes an "active" / "enabled" flag to a boolean.
///
/// Accepted encodings: booleans, the integers `0` and `1`, `null` (inactive),
/// the strings `true`/`false`, `yes`/`no`, `on`/`off`, `active`/`inactive`,
/// `enabled`/`disabled`, `1`/`0` (case insensitive) and a nested
/// `{ "active": .. }` or `{ "enabled": .. }` document holding any of those.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveFlagConverter {
    fields: Vec<String>,
}

impl Default for ActiveFlagConverter {
    fn default() -> Self {
        Self::new(["active", "enabled"])
    }
}

impl ActiveFlagConverter {
    pub const NAME: &'static str = "active-flag";

    pub fn new(fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn normalize(value: &Bson) -> Result<bool, InvalidTypeError> {
        Self::normalize_nested(value, true)
    }

    fn normalize_nested(value: &Bson, allow_nested: bool) -> Result<bool, InvalidTypeError> {
        match value {
            Bson::Boolean(flag) => Ok(*flag),
            Bson::Null => Ok(false),
            Bson::Int32(_) | Bson::Int64(_) => match value.get_i64()? {
                0 => Ok(false),
                1 => Ok(true),
                _ => Err(InvalidTypeError::new("flag (0 or 1)", value)),
            },
            Bson::String(_) => {
                let flag = value.get_str()?.trim().to_ascii_lowercase();
                if TRUTHY.contains(flag.as_str()) {
                    Ok(true)
                } else if FALSY.contains(flag.as_str()) {
                    Ok(false)
                } else {
                    Err(InvalidTypeError::new("flag string", value))
                }
            }
            Bson::Document(_) if allow_nested => {
                let nested = ["active", "enabled"]
                    .into_iter()
                    .find_map(|key| doc::get_path(value, &[BsonKey::from(key)]).ok())
                    .ok_or_else(|| InvalidTypeError::new("flag document", value))?;
                Self::normalize_nested(nested, false)
            }
            other => Err(InvalidTypeError::new("flag", other)),
        }
    }
}

impl ReadConverter for ActiveFlagConverter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn fields(&self) -> &[String] {
        &self.fields
    }

    fn convert(&self, value: &Bson) -> Result<Bson, InvalidTypeError> {
        Self::normalize(value).map(Bson::Boolean)
    }
}

#[derive(Debug, Clone)]
struct ScopedConverter {
    collection: String,
    converter: Arc<dyn ReadConverter>,
}

/// Ordered set of reader converters, each registered for one collection.
///
/// Documents read from a collection only pass through the converters
/// registered for it.
#[derive(Debug, Clone, Default)]
pub struct ConversionSet {
    converters: Vec<ScopedConverter>,
}

impl ConversionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, collection: impl Into<String>, converter: impl ReadConverter) -> Self {
        self.register(collection, converter);
        self
    }

    pub fn register(&mut self, collection: impl Into<String>, converter: impl ReadConverter) {
        self.converters.push(ScopedConverter {
            collection: collection.into(),
            converter: Arc::new(converter),
        });
    }

    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.converters.iter().map(|scoped| scoped.converter.name())
    }

    /// Names of the converters registered for `collection`.
    pub fn names_for<'a>(&'a self, collection: &'a str) -> impl Iterator<Item = &'static str> + 'a {
        self.converters_for(collection).map(|converter| converter.name())
    }

    fn converters_for<'a>(
        &'a self,
        collection: &'a str,
    ) -> impl Iterator<Item = &'a Arc<dyn ReadConverter>> + 'a {
        self.converters
            .iter()
            .filter(move |scoped| scoped.collection == collection)
            .map(|scoped| &scoped.converter)
    }

    /// Rewrites every field registered for `collection` that is present in
    /// `document` in place. Missing fields are left alone.
    pub fn apply(&self, collection: &str, document: &mut Document) -> Result<(), ConversionError> {
        for converter in self.converters_for(collection) {
            for field in converter.fields() {
                let path = BsonKey::parse_path(field);
                let Some(value) = doc::get_path_mut(document, &path) else {
                    continue;
                };
                let converted = converter.convert(value).map_err(|source| ConversionError {
                    converter: converter.name(),
                    field: field.clone(),
                    source,
                })?;
                trace!(
                    converter = converter.name(),
                    collection,
                    field = %field,
                    from = ?value,
                    to = ?converted,
                    "converted field"
                );
                *value = converted;
            }
        }
        Ok(())
    }
}
