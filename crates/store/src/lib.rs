pub mod config;
pub mod connect;
pub mod convert;
pub mod doc;
pub mod persist;
pub mod session;

pub use config::{Endpoint, StoreConfig};
pub use connect::{client_options, connect, open_session, register_conversions};
pub use convert::{ActiveFlagConverter, ConversionError, ConversionSet, ReadConverter};
pub use persist::{ItemResolver, StoredComponent, COLLECTOR_ITEMS, COMPONENTS};
pub use session::Session;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("invalid store configuration: {0}")]
    Configuration(String),

    #[error("failed to connect to mongo at {endpoints}")]
    Connection {
        endpoints: String,
        #[source]
        source: mongodb::error::Error,
    },

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Component(#[from] dashboard_component::ComponentError),

    #[error(transparent)]
    Database(#[from] mongodb::error::Error),

    #[error("failed to serialize document")]
    Serialization(#[from] mongodb::bson::ser::Error),

    #[error("failed to deserialize document")]
    Deserialization(#[from] mongodb::bson::de::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to parse config")]
    Yaml(#[from] serde_yaml::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashboard_component::{CollectorType, ComponentError};

    #[test]
    fn component_errors_keep_their_message() {
        let err: StoreError = ComponentError::NotFound {
            collector_type: CollectorType::Build,
        }
        .into();
        assert!(matches!(err, StoreError::Component(_)));
        assert_eq!(
            err.to_string(),
            ComponentError::NotFound {
                collector_type: CollectorType::Build
            }
            .to_string()
        );
    }

    #[test]
    fn configuration_errors_are_described() {
        let err = "h1".parse::<Endpoint>().unwrap_err();
        assert!(err.to_string().starts_with("invalid store configuration"));
    }
}
