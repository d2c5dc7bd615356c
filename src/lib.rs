pub mod bpf;
pub mod capture;
pub mod classify;
pub mod config;
pub mod consumer;
pub mod error;
pub mod http;
pub mod queue;
pub mod rules;
pub mod store;
pub mod supervisor;

use crate::classify::geoip::GeoIpService;
use crate::classify::geoip_downloader::ensure_geoip_database;
use crate::classify::port_map::PortMap;
use crate::classify::ClassifierPipeline;
use crate::config::EnvConfig;
use crate::http::state::AppState;
use crate::rules::{ConfigFile, PortProtocolRuleSet};
use crate::store::{DocumentStore, MongoDocumentStore};
use crate::supervisor::Supervisor;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tracing::info;

/// Builds the shared classifier pipeline from a freshly loaded config.
pub fn build_pipeline(env: &EnvConfig) -> Arc<ClassifierPipeline> {
    ensure_geoip_database(&env.geoip_db_abs_path, env.maxmind_license_key.as_deref());
    let geoip = Arc::new(GeoIpService::new(env.geoip_db_abs_path.clone()));
    let port_map = Arc::new(PortMap::default());
    Arc::new(ClassifierPipeline::new(geoip, port_map))
}

/// Assembles the full application: store connection, classifier, capture
/// pipeline, and HTTP router. Returns the axum router plus the running
/// supervisor so the caller can hold it open for the process lifetime.
pub async fn bootstrap(env: EnvConfig, config_path: PathBuf) -> anyhow::Result<(axum::Router, Supervisor)> {
    let store: Arc<dyn DocumentStore> = Arc::new(MongoDocumentStore::connect(&env.database_uri, &env.database_name).await?);
    let pipeline = build_pipeline(&env);
    let config_file = ConfigFile::load(&config_path)?;

    let mut rule_set = PortProtocolRuleSet::new();
    for rule in config_file.rules.clone() {
        match rule_set.add(rule.clone()) {
            Ok(()) => {
                for port in &rule.ports {
                    pipeline.port_map().set(*port, rule.protocol.clone());
                }
            }
            Err(e) => tracing::warn!("skipping invalid persisted rule: {e}"),
        }
    }

    let supervisor = Supervisor::start(&env, store.clone(), pipeline.clone(), Handle::current(), &config_file)?;
    info!("bootstrap: pipeline and store ready");

    let state = Arc::new(AppState {
        config: Arc::new(env),
        producer: supervisor.producer.clone(),
        pipeline: pipeline.clone(),
        crud: Arc::new(store::query::CrudService::new(store)),
        filters: Arc::new(Mutex::new(config_file.filters)),
        rules: Arc::new(Mutex::new(rule_set)),
        config_path,
    });

    Ok((http::build_router(state), supervisor))
}
