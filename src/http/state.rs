//! Shared application state threaded through every HTTP handler, following
//! the single shared-state-container convention used across the teacher's
//! command surface.

use crate::bpf::{self, FilterRule};
use crate::capture::producer::Producer;
use crate::classify::ClassifierPipeline;
use crate::config::EnvConfig;
use crate::rules::{ConfigFile, PortProtocolRuleSet};
use crate::store::query::CrudService;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

pub struct AppState {
    pub config: Arc<EnvConfig>,
    pub producer: Arc<Mutex<Producer>>,
    pub pipeline: Arc<ClassifierPipeline>,
    pub crud: Arc<CrudService>,
    pub filters: Arc<Mutex<Vec<FilterRule>>>,
    pub rules: Arc<Mutex<PortProtocolRuleSet>>,
    pub config_path: PathBuf,
}

impl AppState {
    /// Rebuilds the BPF expression from the current filter set and applies
    /// it to the producer. `Capturer::set_filter` bumps a generation counter
    /// the running capture loop checks every iteration, so the new filter
    /// reaches an already-running handle atomically without a restart.
    pub fn apply_filters(&self) {
        let filters = self.filters.lock().unwrap();
        let expr = bpf::build_filter_expression(&filters).unwrap_or_default();
        self.producer.lock().unwrap().apply_filter(expr);
    }

    /// Persists the current filters and rules to the config file.
    pub fn persist_config(&self) -> Result<(), crate::error::AppError> {
        let filters = self.filters.lock().unwrap().clone();
        let rules = self.rules.lock().unwrap().rules().to_vec();
        ConfigFile { filters, rules }.save(&self.config_path)
    }
}
