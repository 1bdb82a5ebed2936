pub mod component;
pub mod item;

pub use bson::oid::ObjectId;
pub use component::{CollectorItems, Component};
pub use item::CollectorItem;

/// Category of an external tool integration.
///
/// The string forms match the names the dashboard has always persisted,
/// so they double as map keys in stored component documents.
#[derive(
    Debug,
    Copy,
    Clone,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
    strum::EnumIter,
    serde::Serialize,
    serde::Deserialize,
)]
pub enum CollectorType {
    #[strum(serialize = "SCM")]
    #[serde(rename = "SCM")]
    Scm,
    #[strum(serialize = "Build")]
    Build,
    #[strum(serialize = "Artifact")]
    Artifact,
    #[strum(serialize = "Deployment")]
    Deployment,
    #[strum(serialize = "Feature")]
    Feature,
    #[strum(serialize = "Test")]
    Test,
    #[strum(serialize = "CodeQuality")]
    CodeQuality,
    #[strum(serialize = "StaticSecurityScan")]
    StaticSecurityScan,
    #[strum(serialize = "LibraryPolicy")]
    LibraryPolicy,
    #[strum(serialize = "Incident")]
    Incident,
    #[strum(serialize = "ChatOps")]
    ChatOps,
    #[strum(serialize = "Cloud")]
    Cloud,
    #[strum(serialize = "AppPerformance")]
    AppPerformance,
    #[strum(serialize = "InfraPerformance")]
    InfraPerformance,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ComponentError {
    #[error("invalid {collector_type} collector item: {reason}")]
    Validation {
        collector_type: CollectorType,
        reason: String,
    },
    #[error("component has no {collector_type} collector items")]
    NotFound { collector_type: CollectorType },
}

impl ComponentError {
    pub fn collector_type(&self) -> CollectorType {
        match self {
            Self::Validation { collector_type, .. } | Self::NotFound { collector_type } => {
                *collector_type
            }
        }
    }
}
