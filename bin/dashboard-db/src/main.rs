use clap::Parser;
use color_eyre::eyre;
use dashboard_component::Component;
use dashboard_store::{Session, StoreConfig};
use opentelemetry::trace::TracerProvider as TracerProviderTrait;
use opentelemetry_sdk::trace::TracerProvider;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Options {
    #[arg(short = 'c', long = "config", aliases = ["conf"], help = "Path to YAML config file")]
    pub config_path: Option<PathBuf>,
    #[arg(long, env = "DBNAME", help = "Database name")]
    pub dbname: Option<String>,
    #[arg(long, env = "DBHOST", help = "Host of a single node deployment")]
    pub dbhost: Option<String>,
    #[arg(long, env = "DBPORT", help = "Port of a single node deployment")]
    pub dbport: Option<u16>,
    #[arg(
        long,
        env = "DBREPLICASET",
        value_parser = clap::builder::BoolishValueParser::new(),
        help = "Connect to the replica set members in --dbhostport"
    )]
    pub dbreplicaset: Option<bool>,
    #[arg(
        long,
        env = "DBHOSTPORT",
        value_delimiter = ',',
        help = "Comma separated host:port replica set members"
    )]
    pub dbhostport: Option<Vec<String>>,
    #[arg(long, env = "DBUSERNAME")]
    pub dbusername: Option<String>,
    #[arg(long, env = "DBPASSWORD", hide_env_values = true)]
    pub dbpassword: Option<String>,
    #[arg(long = "component", help = "Only report the component with this name")]
    pub component: Option<String>,
}

impl Options {
    /// Config file (or defaults) with command line and environment values on top.
    pub fn store_config(&self) -> eyre::Result<StoreConfig> {
        let mut config = match &self.config_path {
            Some(path) => StoreConfig::from_file(path)?,
            None => StoreConfig::default(),
        };
        if let Some(dbname) = &self.dbname {
            config.dbname = dbname.clone();
        }
        if let Some(dbhost) = &self.dbhost {
            config.dbhost = dbhost.clone();
        }
        if let Some(dbport) = self.dbport {
            config.dbport = dbport;
        }
        if let Some(dbreplicaset) = self.dbreplicaset {
            config.dbreplicaset = dbreplicaset;
        }
        if let Some(dbhostport) = &self.dbhostport {
            config.dbhostport = dbhostport.clone();
        }
        if self.dbusername.is_some() {
            config.dbusername = self.dbusername.clone();
        }
        if self.dbpassword.is_some() {
            config.dbpassword = self.dbpassword.clone();
        }
        Ok(config)
    }
}

pub const APPLICATION_NAME: &str = "dashboard-db";

fn setup_telemetry() -> eyre::Result<()> {
    let provider = TracerProvider::builder().build();
    let tracer = provider.tracer(APPLICATION_NAME);

    let telemetry = tracing_opentelemetry::layer().with_tracer(tracer);

    let subscriber = tracing_subscriber::registry()
        .with(telemetry)
        .with(
            tracing_subscriber::fmt::Layer::new()
                .compact()
                .with_writer(std::io::stdout),
        )
        .with(tracing_subscriber::filter::EnvFilter::from_default_env());
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn report_component(component: &Component) {
    info!(
        component = component.name(),
        owner = component.owner().unwrap_or_default(),
        id = ?component.id(),
        "component"
    );
    for collector_type in component.collector_types() {
        let items = component.items(collector_type);
        match component.most_recently_updated_item(collector_type) {
            Some(latest) => info!(
                component = component.name(),
                %collector_type,
                count = items.len(),
                latest = ?latest.id,
                last_updated = latest.last_updated,
                "collector items"
            ),
            None => info!(
                component = component.name(),
                %collector_type,
                count = items.len(),
                "collector items"
            ),
        }
    }
}

async fn report(session: &Session, name: Option<&str>) -> eyre::Result<()> {
    match name {
        Some(name) => match session.find_component_by_name(name).await? {
            Some(component) => report_component(&component),
            None => warn!(component = name, "no such component"),
        },
        None => {
            let components = session.list_components().await?;
            info!(count = components.len(), "loaded components");
            for component in &components {
                report_component(component);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    setup_telemetry()?;

    let options = Options::parse();
    let config = options.store_config()?;
    info!(?config, "loaded configuration");

    let client = tokio::select! {
        client = dashboard_store::connect(&config) => client?,
        _ = tokio::signal::ctrl_c() => {
            warn!("received ctrl-c before connecting");
            return Ok(());
        }
    };
    let session = dashboard_store::open_session(client, config.dbname.clone());

    let result = tokio::select! {
        result = report(&session, options.component.as_deref()) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("received ctrl-c");
            info!("initiate graceful shutdown");
            Ok(())
        }
    };
    session.shutdown().await;
    result
}
