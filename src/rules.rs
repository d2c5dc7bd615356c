//! Port/protocol rule set and the persisted YAML config file tying filters
//! and rules together.
//!
//! Grounded on the config persistence convention visible across the
//! teacher's `db` layer (load-then-mutate-then-persist), adapted here to a
//! flat file instead of SQLite since the config this crate persists is
//! small and infrequently written.

use crate::bpf::FilterRule;
use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortProtocolRule {
    pub ports: Vec<u16>,
    pub protocol: String,
}

/// Enforces the collection invariant that no port appears in more than one
/// rule, independent of the backing file format.
#[derive(Debug, Default)]
pub struct PortProtocolRuleSet {
    rules: Vec<PortProtocolRule>,
}

impl PortProtocolRuleSet {
    pub fn new() -> Self {
        PortProtocolRuleSet::default()
    }

    pub fn rules(&self) -> &[PortProtocolRule] {
        &self.rules
    }

    /// Inserts a rule, rejecting it if any of its ports already belong to
    /// another rule.
    pub fn add(&mut self, rule: PortProtocolRule) -> Result<(), AppError> {
        let mut seen: HashMap<u16, &str> = HashMap::new();
        for existing in &self.rules {
            for port in &existing.ports {
                seen.insert(*port, existing.protocol.as_str());
            }
        }
        for port in &rule.ports {
            if let Some(owner) = seen.get(port) {
                return Err(AppError::InvalidInput(format!(
                    "port {port} already assigned to protocol {owner}"
                )));
            }
        }
        self.rules.push(rule);
        Ok(())
    }

    /// Removes the rule for `protocol` and returns the ports it had owned,
    /// so a caller can free them from any other table keyed by port.
    pub fn remove_protocol(&mut self, protocol: &str) -> Vec<u16> {
        let mut freed = Vec::new();
        self.rules.retain(|r| {
            if r.protocol == protocol {
                freed.extend(r.ports.iter().copied());
                false
            } else {
                true
            }
        });
        freed
    }

    pub fn lookup_port(&self, port: u16) -> Option<&str> {
        self.rules.iter().find(|r| r.ports.contains(&port)).map(|r| r.protocol.as_str())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub filters: Vec<FilterRule>,
    #[serde(default)]
    pub rules: Vec<PortProtocolRule>,
}

impl ConfigFile {
    /// Reads the config file, tolerating a missing file as an empty config.
    pub fn load(path: &Path) -> Result<ConfigFile, AppError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                serde_yaml::from_str(&contents).map_err(|e| AppError::Config(format!("malformed config file: {e}")))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
            Err(e) => Err(AppError::Io(e.to_string())),
        }
    }

    /// Writes the config atomically: serialise to a temp file in the same
    /// directory, then rename over the target so readers never observe a
    /// partially-written file.
    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        let yaml = serde_yaml::to_string(self).map_err(|e| AppError::Config(e.to_string()))?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        use std::io::Write;
        tmp.write_all(yaml.as_bytes())?;
        tmp.persist(path).map_err(|e| AppError::Io(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(ports: &[u16], protocol: &str) -> PortProtocolRule {
        PortProtocolRule { ports: ports.to_vec(), protocol: protocol.to_string() }
    }

    #[test]
    fn test_add_rejects_duplicate_port() {
        let mut set = PortProtocolRuleSet::new();
        set.add(rule(&[8080], "HTTP-ALT")).unwrap();
        let err = set.add(rule(&[8080], "OTHER")).unwrap_err();
        assert_eq!(err.kind(), "InvalidInput");
    }

    #[test]
    fn test_add_accepts_disjoint_ports() {
        let mut set = PortProtocolRuleSet::new();
        set.add(rule(&[8080], "HTTP-ALT")).unwrap();
        set.add(rule(&[9090], "OTHER")).unwrap();
        assert_eq!(set.rules().len(), 2);
    }

    #[test]
    fn test_lookup_port_finds_owning_protocol() {
        let mut set = PortProtocolRuleSet::new();
        set.add(rule(&[8080, 8081], "HTTP-ALT")).unwrap();
        assert_eq!(set.lookup_port(8081), Some("HTTP-ALT"));
        assert_eq!(set.lookup_port(9999), None);
    }

    #[test]
    fn test_remove_protocol_frees_its_ports() {
        let mut set = PortProtocolRuleSet::new();
        set.add(rule(&[8080], "HTTP-ALT")).unwrap();
        set.remove_protocol("HTTP-ALT");
        set.add(rule(&[8080], "OTHER")).unwrap();
        assert_eq!(set.lookup_port(8080), Some("OTHER"));
    }

    #[test]
    fn test_load_missing_file_yields_empty_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.yaml");
        let config = ConfigFile::load(&path).unwrap();
        assert!(config.filters.is_empty());
        assert!(config.rules.is_empty());
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let config = ConfigFile {
            filters: vec![FilterRule { src_ip: Some("10.0.0.1".into()), ..Default::default() }],
            rules: vec![rule(&[8080], "HTTP-ALT")],
        };
        config.save(&path).unwrap();
        let loaded = ConfigFile::load(&path).unwrap();
        assert_eq!(loaded.filters.len(), 1);
        assert_eq!(loaded.rules.len(), 1);
        assert_eq!(loaded.rules[0].protocol, "HTTP-ALT");
    }

    #[test]
    fn test_save_overwrites_existing_file_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        ConfigFile::default().save(&path).unwrap();
        let updated = ConfigFile { filters: vec![], rules: vec![rule(&[22], "SSH")] };
        updated.save(&path).unwrap();
        let loaded = ConfigFile::load(&path).unwrap();
        assert_eq!(loaded.rules[0].protocol, "SSH");
    }
}
