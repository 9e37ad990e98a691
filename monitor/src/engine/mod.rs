//! Container engine access.
//!
//! The rest of the crate only talks to the engine through the [`Engine`] trait, which keeps
//! the cache independent from the concrete client. [`DockerEngine`] is backed by `bollard`,
//! [`MemoryEngine`] simulates a host in-process for the demo mode and for tests.

mod docker;
mod memory;

use alloc::boxed::Box;
use core::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

pub use docker::{DockerEngine, Endpoint};
pub use memory::{MemoryContainer, MemoryEngine};

/// Boxed source error, so engine implementations don't leak their client error types.
pub type BoxError = Box<dyn core::error::Error + Send + Sync>;

/// Host metadata as reported by the engine. Every field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: Option<String>,
    pub api_version: Option<String>,
    pub os: Option<String>,
    pub arch: Option<String>,
    pub kernel: Option<String>,
}

/// The attributes of a single container that the cache keeps track of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDetails {
    /// Raw lifecycle status, e.g. `running` or `exited`.
    pub status: String,
    /// Start time as reported by the engine (RFC 3339), unparsed.
    pub started_at: Option<String>,
    /// Tags of the image the container was created from, in engine order.
    pub image_tags: Vec<String>,
}

/// Errors returned by [`Engine`] implementations.
#[derive(Debug, ThisError)]
pub enum EngineError {
    #[error("Cannot reach container engine at {endpoint}")]
    Connection {
        endpoint: String,
        #[source]
        source: BoxError,
    },
    #[error("Malformed engine endpoint '{0}' (expected unix://, tcp:// or http://)")]
    MalformedEndpoint(String),
    #[error("Container '{0}' not found")]
    NotFound(String),
    #[error("Engine request failed: {context}")]
    Request {
        context: String,
        #[source]
        source: BoxError,
    },
}

impl EngineError {
    /// Wrap an arbitrary client error as a failed request.
    pub fn request(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Request {
            context: context.into(),
            source: source.into(),
        }
    }
}

/// Capability to query a container engine and to issue commands against named containers.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Cheap reachability check.
    async fn ping(&self) -> Result<(), EngineError>;

    /// Fetch host version metadata.
    async fn version(&self) -> Result<VersionInfo, EngineError>;

    /// List container names, optionally including stopped containers.
    async fn list_containers(&self, include_stopped: bool) -> Result<Vec<String>, EngineError>;

    /// Fetch the current attributes of a named container.
    async fn inspect_container(&self, name: &str) -> Result<ContainerDetails, EngineError>;

    async fn start_container(&self, name: &str) -> Result<(), EngineError>;

    /// Stop a container, giving it `timeout` to exit before it gets killed.
    async fn stop_container(&self, name: &str, timeout: Duration) -> Result<(), EngineError>;
}
