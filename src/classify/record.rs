//! The persisted unit produced by the classifier pipeline.

use serde::{Deserialize, Serialize};

/// A packet as captured, before classification.
#[derive(Debug, Clone)]
pub struct RawPacket {
    pub bytes: Vec<u8>,
    pub timestamp: f64,
}

/// OSI-layer tag. Variants are ordered so `layer as u8` only ever increases
/// as the pipeline runs — see `ClassifiedRecord::bump_layer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Physical,
    Datalink,
    Network,
    Transport,
    Application,
}

/// A classified packet record, ready to persist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub timestamp: f64,
    pub layer: Layer,
    pub source_ip: String,
    pub source_port: i32,
    pub dest_port: i32,
    pub source_region: String,
    pub protocol: String,
    pub length: u32,
    pub is_handshake: bool,
}

impl ClassifiedRecord {
    /// Creates a fresh record for a just-captured packet at the datalink
    /// layer, with no protocol identified yet.
    pub fn new(timestamp: f64, length: u32) -> Self {
        ClassifiedRecord {
            id: String::new(),
            timestamp,
            layer: Layer::Datalink,
            source_ip: String::new(),
            source_port: -1,
            dest_port: -1,
            source_region: "Unknown".to_string(),
            protocol: "Unknown".to_string(),
            length,
            is_handshake: false,
        }
    }

    /// Advances `layer` forward only; a processor that would regress the
    /// layer is a bug and is ignored rather than applied.
    pub fn bump_layer(&mut self, layer: Layer) {
        if layer > self.layer {
            self.layer = layer;
        }
    }
}
