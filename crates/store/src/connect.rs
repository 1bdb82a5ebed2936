use crate::config::StoreConfig;
use crate::convert::{ActiveFlagConverter, ConversionSet};
use crate::persist::COLLECTOR_ITEMS;
use crate::session::Session;
use crate::StoreError;
use mongodb::options::{ClientOptions, ServerAddress};
use mongodb::{bson, Client};
use std::time::Duration;
use tracing::{debug, info};

/// Connections idle for longer than this are closed by the driver.
pub const MAX_CONNECTION_IDLE_TIME: Duration = Duration::from_secs(60);

pub const APP_NAME: &str = "dashboard-store";

/// Driver options for `config`, without touching the network.
///
/// Fails with [`StoreError::Configuration`] on malformed endpoints or unpaired
/// credentials.
pub fn client_options(config: &StoreConfig) -> Result<ClientOptions, StoreError> {
    let endpoints = config.resolve_endpoints()?;
    let credential = config.credential()?;

    for endpoint in &endpoints {
        if config.dbreplicaset {
            info!(%endpoint, "initializing mongo client for replica set member");
        } else {
            info!(%endpoint, "initializing mongo client");
        }
    }

    let mut options = ClientOptions::builder()
        .hosts(endpoints.into_iter().map(ServerAddress::from).collect::<Vec<_>>())
        .build();
    options.max_idle_time = Some(MAX_CONNECTION_IDLE_TIME);
    options.app_name = Some(APP_NAME.to_string());
    options.credential = credential;
    Ok(options)
}

/// Builds the process wide client and confirms the store is reachable.
///
/// Configuration is validated before any connection attempt. An unreachable
/// store fails with [`StoreError::Connection`]; nothing is retried.
pub async fn connect(config: &StoreConfig) -> Result<Client, StoreError> {
    let options = client_options(config)?;
    let endpoints = options
        .hosts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    let authenticated = options.credential.is_some();

    let client = Client::with_options(options).map_err(|source| StoreError::Connection {
        endpoints: endpoints.clone(),
        source,
    })?;

    // send ping to confirm a successful connection
    let start = std::time::Instant::now();
    client
        .database("admin")
        .run_command(bson::doc! { "ping": 1 })
        .await
        .map_err(|source| StoreError::Connection {
            endpoints: endpoints.clone(),
            source,
        })?;
    debug!("ping completed in {:?}", start.elapsed());

    info!(
        endpoints = %endpoints,
        database = %config.dbname,
        authenticated,
        "connected to mongo"
    );
    Ok(client)
}

/// Wraps `client` into a session on `database_name` with the reader
/// conversions from [`register_conversions`].
pub fn open_session(client: Client, database_name: impl Into<String>) -> Session {
    Session::new(client, database_name, register_conversions())
}

/// Reader side conversions registered with every session. The active flag
/// is only normalized on collector items.
pub fn register_conversions() -> ConversionSet {
    ConversionSet::new().with(COLLECTOR_ITEMS, ActiveFlagConverter::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::COMPONENTS;
    use mongodb::options::AuthMechanism;

    #[test]
    fn options_carry_idle_timeout_and_hosts() {
        let config = StoreConfig {
            dbreplicaset: true,
            dbhostport: vec!["h1:1001".to_string(), "h2:1002".to_string()],
            ..StoreConfig::default()
        };
        let options = client_options(&config).unwrap();
        assert_eq!(options.max_idle_time, Some(Duration::from_secs(60)));
        assert_eq!(
            options.hosts,
            vec![
                ServerAddress::Tcp {
                    host: "h1".to_string(),
                    port: Some(1001)
                },
                ServerAddress::Tcp {
                    host: "h2".to_string(),
                    port: Some(1002)
                },
            ]
        );
        assert!(options.credential.is_none());
    }

    #[test]
    fn options_authenticate_against_configured_database() {
        let config = StoreConfig {
            dbname: "metrics".to_string(),
            dbusername: Some("admin".to_string()),
            dbpassword: Some("secret".to_string()),
            ..StoreConfig::default()
        };
        let credential = client_options(&config).unwrap().credential.unwrap();
        assert_eq!(credential.source.as_deref(), Some("metrics"));
        assert_eq!(credential.mechanism, Some(AuthMechanism::ScramSha1));
    }

    #[tokio::test]
    async fn malformed_endpoint_fails_before_connecting() {
        let config = StoreConfig {
            dbreplicaset: true,
            dbhostport: vec!["h1".to_string()],
            ..StoreConfig::default()
        };
        let err = connect(&config).await.unwrap_err();
        assert!(matches!(err, StoreError::Configuration(_)), "{err}");
    }

    #[tokio::test]
    async fn half_credentials_fail_before_connecting() {
        let config = StoreConfig {
            dbusername: Some("admin".to_string()),
            dbpassword: Some(String::new()),
            ..StoreConfig::default()
        };
        let err = connect(&config).await.unwrap_err();
        assert!(matches!(err, StoreError::Configuration(_)), "{err}");
    }

    #[test]
    fn exactly_one_conversion_is_registered() {
        let conversions = register_conversions();
        assert_eq!(conversions.len(), 1);
        assert_eq!(
            conversions.names().collect::<Vec<_>>(),
            vec![ActiveFlagConverter::NAME]
        );
        assert_eq!(conversions.names_for(COLLECTOR_ITEMS).count(), 1);
        assert_eq!(conversions.names_for(COMPONENTS).count(), 0);
    }
}
