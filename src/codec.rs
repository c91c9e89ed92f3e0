//! Segment body format registry.
//!
//! A catalog snapshot records, per segment, only the *name* of the format
//! that encoded its body files. The strategy behind the name lives here:
//! loading a snapshot resolves every recorded name through a
//! [`CodecRegistry`] so an unreadable segment is reported at catalog load
//! time instead of on first body access.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, XystonError};

/// A segment body format.
///
/// The catalog layer never encodes or decodes bodies itself; it stores the
/// codec name and hands resolution to the registry. The segment read/write
/// pipeline downcasts capability from here.
pub trait SegmentCodec: Send + Sync + fmt::Debug {
    /// The name recorded in catalog snapshots.
    fn name(&self) -> &str;

    /// File names the body format owns for a segment.
    fn body_file_names(&self, segment_name: &str) -> Vec<String>;
}

/// The current default body format.
#[derive(Debug, Default, Clone, Copy)]
pub struct Xyston80Codec;

/// Name of the default body format.
pub const DEFAULT_CODEC_NAME: &str = "Xyston80";

impl SegmentCodec for Xyston80Codec {
    fn name(&self) -> &str {
        DEFAULT_CODEC_NAME
    }

    fn body_file_names(&self, segment_name: &str) -> Vec<String> {
        vec![
            format!("{segment_name}.trm"),
            format!("{segment_name}.pst"),
            format!("{segment_name}.nrm"),
        ]
    }
}

/// Resolves body formats by name.
#[derive(Debug, Clone)]
pub struct CodecRegistry {
    codecs: HashMap<String, Arc<dyn SegmentCodec>>,
}

impl CodecRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        CodecRegistry {
            codecs: HashMap::new(),
        }
    }

    /// Create a registry with the built-in default format registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(Xyston80Codec));
        registry
    }

    /// Register a codec under its own name, replacing any previous codec
    /// with the same name.
    pub fn register(&mut self, codec: Arc<dyn SegmentCodec>) {
        self.codecs.insert(codec.name().to_string(), codec);
    }

    /// Resolve a codec by name.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn SegmentCodec>> {
        self.codecs.get(name).cloned().ok_or_else(|| {
            XystonError::unknown_codec(format!(
                "'{name}' is not registered; was the index written by a newer engine?"
            ))
        })
    }

    /// Whether a codec with the given name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.codecs.contains_key(name)
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
