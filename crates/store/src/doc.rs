use mongodb::bson::{oid::ObjectId, Bson, Document};

#[derive(Copy, Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum BsonKey<'a> {
    KeyStr(&'a str),
    Index(usize),
}

impl<'a> std::fmt::Display for BsonKey<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeyStr(key) => std::fmt::Display::fmt(key, f),
            Self::Index(idx) => std::fmt::Display::fmt(idx, f),
        }
    }
}

impl<'a> From<usize> for BsonKey<'a> {
    fn from(value: usize) -> Self {
        BsonKey::Index(value)
    }
}

impl<'a> From<&'a str> for BsonKey<'a> {
    fn from(value: &'a str) -> Self {
        BsonKey::KeyStr(value)
    }
}

impl<'a> BsonKey<'a> {
    /// Splits a dotted field path (`options.flags.0`) into keys.
    /// Numeric segments address array elements.
    pub fn parse_path(path: &'a str) -> Vec<BsonKey<'a>> {
        path.split('.')
            .map(|segment| match segment.parse::<usize>() {
                Ok(idx) => BsonKey::Index(idx),
                Err(_) => BsonKey::KeyStr(segment),
            })
            .collect()
    }
}

pub fn get<'a>(value: &'a Bson, key: BsonKey<'_>) -> Option<&'a Bson> {
    match (value, key) {
        (Bson::Array(arr), BsonKey::Index(idx)) => arr.get(idx),
        (Bson::Document(doc), BsonKey::KeyStr(key)) => doc.get(key),
        _ => None,
    }
}

pub fn get_mut<'a>(value: &'a mut Bson, key: BsonKey<'_>) -> Option<&'a mut Bson> {
    match (value, key) {
        (Bson::Array(arr), BsonKey::Index(idx)) => arr.get_mut(idx),
        (Bson::Document(doc), BsonKey::KeyStr(key)) => doc.get_mut(key),
        _ => None,
    }
}

/// Mutable lookup of `path` inside a top level document.
pub fn get_path_mut<'a>(document: &'a mut Document, path: &[BsonKey<'_>]) -> Option<&'a mut Bson> {
    let (first, rest) = path.split_first()?;
    let BsonKey::KeyStr(first) = first else {
        return None;
    };
    let mut value = document.get_mut(*first)?;
    for key in rest {
        value = get_mut(value, *key)?;
    }
    Some(value)
}

pub trait BsonValue {
    fn get_str(&self) -> Result<&str, InvalidTypeError>;
    fn get_i64(&self) -> Result<i64, InvalidTypeError>;
    fn get_object_id(&self) -> Result<ObjectId, InvalidTypeError>;
}

impl BsonValue for Bson {
    fn get_str(&self) -> Result<&str, InvalidTypeError> {
        self.as_str()
            .ok_or_else(|| InvalidTypeError::new("string", self))
    }

    fn get_i64(&self) -> Result<i64, InvalidTypeError> {
        match self {
            Bson::Int64(v) => Ok(*v),
            Bson::Int32(v) => Ok((*v).into()),
            other => Err(InvalidTypeError::new("integer", other)),
        }
    }

    fn get_object_id(&self) -> Result<ObjectId, InvalidTypeError> {
        self.as_object_id()
            .ok_or_else(|| InvalidTypeError::new("object id", self))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OwnedPath(Vec<String>);

impl std::fmt::Display for OwnedPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl<'a, 'k: 'a> FromIterator<&'a BsonKey<'k>> for OwnedPath {
    fn from_iter<T: IntoIterator<Item = &'a BsonKey<'k>>>(iter: T) -> Self {
        Self(iter.into_iter().map(ToString::to_string).collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub path: OwnedPath,
    pub value: Bson,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("invalid type: expected {expected_type}, found {value:?}")]
pub struct InvalidTypeError {
    pub expected_type: String,
    pub value: Bson,
}

impl InvalidTypeError {
    pub fn new(expected_type: impl Into<String>, value: &Bson) -> Self {
        Self {
            expected_type: expected_type.into(),
            value: value.clone(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub struct Error {
    pub path: OwnedPath,
    #[source]
    pub source: QueryError,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.path.to_string(), self.source)
    }
}

impl Error {
    pub fn partial_match(&self) -> Option<&Match> {
        match &self.source {
            QueryError::NotFound { partial_match } => partial_match.as_ref(),
            QueryError::InvalidType(_) => None,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum QueryError {
    #[error("not found")]
    NotFound { partial_match: Option<Match> },
    #[error(transparent)]
    InvalidType(InvalidTypeError),
}

pub fn get_path<'b>(document: &'b Bson, path: &[BsonKey<'_>]) -> Result<&'b Bson, Error> {
    let mut value: &Bson = document;
    for (idx, key) in path.iter().copied().enumerate() {
        value = get(value, key).ok_or_else(|| Error {
            path: OwnedPath::from_iter(path.iter()),
            source: QueryError::NotFound {
                partial_match: Some(Match {
                    path: OwnedPath::from_iter(path[..idx].iter()),
                    value: value.clone(),
                }),
            },
        })?;
    }
    Ok(value)
}

/// Object id stored at `path`.
pub fn get_object_id(document: &Bson, path: &[BsonKey<'_>]) -> Result<ObjectId, Error> {
    get_path(document, path)?
        .get_object_id()
        .map_err(|err| Error {
            path: OwnedPath::from_iter(path.iter()),
            source: QueryError::InvalidType(err),
        })
}
