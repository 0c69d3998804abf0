//! Cache keys for compiled autotuning candidates

use std::fmt;

use serde::Serialize;

/// Identifies a computation on a class of device.
///
/// Executables compiled for one device class may not run on another, so the
/// device class is part of the key alongside the computation fingerprint.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AutotuneCacheKey {
    /// Device model the computation is compiled for
    device_class: String,
    /// Structural fingerprint of the computation
    fingerprint: String,
}

impl AutotuneCacheKey {
    pub fn new(device_class: impl Into<String>, fingerprint: impl Into<String>) -> Self {
        Self {
            device_class: device_class.into(),
            fingerprint: fingerprint.into(),
        }
    }

    pub fn device_class(&self) -> &str {
        &self.device_class
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

impl fmt::Debug for AutotuneCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for AutotuneCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.device_class, self.fingerprint)
    }
}

/// One candidate configuration of an autotuning sweep.
///
/// The configuration is opaque to the engine: it is stored as its serialized
/// form, and two candidates are equal exactly when they serialize to the same
/// text.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CandidateConfig {
    serialized: String,
}

impl CandidateConfig {
    /// Serialize `config` into a candidate
    pub fn new<T: Serialize + ?Sized>(config: &T) -> serde_json::Result<Self> {
        Ok(Self {
            serialized: serde_json::to_string(config)?,
        })
    }

    /// Use already serialized content as the candidate identity
    pub fn from_serialized(serialized: impl Into<String>) -> Self {
        Self {
            serialized: serialized.into(),
        }
    }

    /// Serialized content
    pub fn as_str(&self) -> &str {
        &self.serialized
    }

    /// Deserialize the candidate back into a typed configuration
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.serialized)
    }
}

impl fmt::Debug for CandidateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CandidateConfig({})", self.serialized)
    }
}

/// Key of the compilation cache: a computation and one candidate for it
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CompilationKey {
    autotune_key: AutotuneCacheKey,
    config: CandidateConfig,
}

impl CompilationKey {
    pub fn new(autotune_key: AutotuneCacheKey, config: CandidateConfig) -> Self {
        Self {
            autotune_key,
            config,
        }
    }

    pub fn autotune_key(&self) -> &AutotuneCacheKey {
        &self.autotune_key
    }

    pub fn config(&self) -> &CandidateConfig {
        &self.config
    }
}

impl fmt::Debug for CompilationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for CompilationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<key={}, config={}>",
            self.autotune_key, self.config.serialized
        )
    }
}
