use crate::StoreError;
use mongodb::options::{AuthMechanism, Credential, ServerAddress};
use serde::{Deserialize, Deserializer, Serialize};

pub const DEFAULT_DATABASE: &str = "dashboard";
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 27017;

/// Connection settings, read once at startup.
///
/// Missing keys fall back to the defaults of a local single node
/// (`dashboard` on `localhost:27017`, no credentials).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub dbname: String,
    pub dbhost: String,
    pub dbport: u16,
    pub dbreplicaset: bool,
    /// Replica set members as `host:port`. Accepts a list or a comma separated string.
    #[serde(deserialize_with = "comma_separated")]
    pub dbhostport: Vec<String>,
    pub dbusername: Option<String>,
    pub dbpassword: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dbname: DEFAULT_DATABASE.to_string(),
            dbhost: DEFAULT_HOST.to_string(),
            dbport: DEFAULT_PORT,
            dbreplicaset: false,
            dbhostport: vec![format!("{DEFAULT_HOST}:{DEFAULT_PORT}")],
            dbusername: None,
            dbpassword: None,
        }
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("dbname", &self.dbname)
            .field("dbhost", &self.dbhost)
            .field("dbport", &self.dbport)
            .field("dbreplicaset", &self.dbreplicaset)
            .field("dbhostport", &self.dbhostport)
            .field("dbusername", &self.dbusername)
            .field("dbpassword", &self.dbpassword.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn comma_separated<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum HostPorts {
        List(Vec<String>),
        Joined(String),
    }

    Ok(match HostPorts::deserialize(deserializer)? {
        HostPorts::List(list) => list,
        HostPorts::Joined(joined) => joined.split(',').map(str::to_string).collect(),
    })
}

impl StoreConfig {
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, StoreError> {
        let file = std::fs::OpenOptions::new().read(true).open(path)?;
        let reader = std::io::BufReader::new(file);
        Self::from_reader(reader)
    }

    pub fn from_reader(reader: impl std::io::BufRead) -> Result<Self, StoreError> {
        let config = serde_yaml::from_reader(reader)?;
        Ok(config)
    }

    pub fn username(&self) -> Option<&str> {
        self.dbusername.as_deref().filter(|name| !name.is_empty())
    }

    pub fn password(&self) -> Option<&str> {
        self.dbpassword.as_deref().filter(|password| !password.is_empty())
    }

    /// Endpoints the client connects to: every `dbhostport` entry in replica
    /// set mode, `dbhost:dbport` otherwise.
    pub fn resolve_endpoints(&self) -> Result<Vec<Endpoint>, StoreError> {
        if !self.dbreplicaset {
            return Ok(vec![Endpoint::new(self.dbhost.clone(), self.dbport)]);
        }
        if self.dbhostport.is_empty() {
            return Err(StoreError::Configuration(
                "replica set mode requires at least one host:port endpoint".to_string(),
            ));
        }
        self.dbhostport
            .iter()
            .map(|entry| entry.parse::<Endpoint>())
            .collect()
    }

    /// SCRAM-SHA-1 credential authenticating against the configured database.
    ///
    /// Username and password must be given together; empty values count as absent.
    pub fn credential(&self) -> Result<Option<Credential>, StoreError> {
        match (self.username(), self.password()) {
            (None, None) => Ok(None),
            (Some(username), Some(password)) => {
                let mut credential = Credential::default();
                credential.username = Some(username.to_string());
                credential.password = Some(password.to_string());
                credential.source = Some(self.dbname.clone());
                credential.mechanism = Some(AuthMechanism::ScramSha1);
                Ok(Some(credential))
            }
            (Some(_), None) => Err(StoreError::Configuration(
                "username is set but password is empty".to_string(),
            )),
            (None, Some(_)) => Err(StoreError::Configuration(
                "password is set but username is empty".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl std::str::FromStr for Endpoint {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| {
            StoreError::Configuration(format!("invalid endpoint {value:?}: {reason}"))
        };
        match &*value.trim().split(':').collect::<Vec<_>>() {
            [_] => Err(invalid("expected host:port")),
            [host, _] if host.is_empty() => Err(invalid("empty host")),
            [host, port] => {
                let port = port
                    .parse()
                    .map_err(|_| invalid("port is not a number in 0..=65535"))?;
                Ok(Self::new(*host, port))
            }
            _ => Err(invalid("unexpected host format")),
        }
    }
}

impl From<Endpoint> for ServerAddress {
    fn from(endpoint: Endpoint) -> Self {
        ServerAddress::Tcp {
            host: endpoint.host,
            port: Some(endpoint.port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replica_set(endpoints: &[&str]) -> StoreConfig {
        StoreConfig {
            dbreplicaset: true,
            dbhostport: endpoints.iter().map(ToString::to_string).collect(),
            ..StoreConfig::default()
        }
    }

    #[test]
    fn defaults_point_at_local_single_node() {
        let config = StoreConfig::default();
        assert_eq!(config.dbname, "dashboard");
        assert_eq!(
            config.resolve_endpoints().unwrap(),
            vec![Endpoint::new("localhost", 27017)]
        );
        assert!(config.credential().unwrap().is_none());
    }

    #[test]
    fn missing_yaml_keys_take_defaults() {
        let yaml = "dbname: metrics\ndbport: 27018\n";
        let config = StoreConfig::from_reader(yaml.as_bytes()).unwrap();
        assert_eq!(
            config,
            StoreConfig {
                dbname: "metrics".to_string(),
                dbport: 27018,
                ..StoreConfig::default()
            }
        );
    }

    #[test]
    fn host_ports_accept_comma_separated_string() {
        let yaml = "dbreplicaset: true\ndbhostport: \"h1:1001,h2:1002\"\n";
        let config = StoreConfig::from_reader(yaml.as_bytes()).unwrap();
        assert_eq!(config.dbhostport, vec!["h1:1001", "h2:1002"]);

        let yaml = "dbhostport: [\"h1:1001\"]\n";
        let config = StoreConfig::from_reader(yaml.as_bytes()).unwrap();
        assert_eq!(config.dbhostport, vec!["h1:1001"]);
    }

    #[test]
    fn replica_set_resolves_every_endpoint() {
        let config = replica_set(&["h1:1001", "h2:1002"]);
        assert_eq!(
            config.resolve_endpoints().unwrap(),
            vec![Endpoint::new("h1", 1001), Endpoint::new("h2", 1002)]
        );
    }

    #[test]
    fn single_node_ignores_host_ports() {
        let config = StoreConfig {
            dbhost: "db.internal".to_string(),
            dbport: 27019,
            dbhostport: vec!["garbage".to_string()],
            ..StoreConfig::default()
        };
        assert_eq!(
            config.resolve_endpoints().unwrap(),
            vec![Endpoint::new("db.internal", 27019)]
        );
    }

    #[test]
    fn malformed_endpoints_are_rejected() {
        for endpoints in [
            vec!["h1"],
            vec!["h1:1001", "h2"],
            vec!["h1:port"],
            vec!["h1:70000"],
            vec![":1001"],
            vec!["h1:1:2"],
        ] {
            let err = replica_set(&endpoints).resolve_endpoints().unwrap_err();
            assert!(
                matches!(err, StoreError::Configuration(_)),
                "{endpoints:?}: {err}"
            );
        }
        assert!(matches!(
            replica_set(&[]).resolve_endpoints(),
            Err(StoreError::Configuration(_))
        ));
    }

    #[test]
    fn credentials_must_be_paired() {
        let with = |username: &str, password: &str| StoreConfig {
            dbusername: Some(username.to_string()),
            dbpassword: Some(password.to_string()),
            ..StoreConfig::default()
        };
        assert!(matches!(
            with("admin", "").credential(),
            Err(StoreError::Configuration(_))
        ));
        assert!(matches!(
            with("", "secret").credential(),
            Err(StoreError::Configuration(_))
        ));
        assert!(with("", "").credential().unwrap().is_none());

        let credential = with("admin", "secret").credential().unwrap().unwrap();
        assert_eq!(credential.username.as_deref(), Some("admin"));
        assert_eq!(credential.password.as_deref(), Some("secret"));
        assert_eq!(credential.source.as_deref(), Some("dashboard"));
        assert_eq!(credential.mechanism, Some(AuthMechanism::ScramSha1));
    }

    #[test]
    fn debug_output_hides_password() {
        let config = StoreConfig {
            dbusername: Some("admin".to_string()),
            dbpassword: Some("secret".to_string()),
            ..StoreConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(debug.contains("admin"));
        assert!(!debug.contains("secret"));
    }
}
