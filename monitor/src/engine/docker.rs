//! [`Engine`] implementation backed by a Docker-compatible daemon through `bollard`.

use alloc::string::{String, ToString as _};
use core::{fmt, str::FromStr, time::Duration};

use async_trait::async_trait;
use bollard::{
    API_DEFAULT_VERSION, Docker,
    container::{
        InspectContainerOptions, ListContainersOptions, StartContainerOptions,
        StopContainerOptions,
    },
    errors::Error as BollardError,
};
use tracing::debug;

use super::{ContainerDetails, Engine, EngineError, VersionInfo};

/// Seconds bollard waits for a single request before giving up.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// A parsed engine endpoint. TLS endpoints are not supported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `unix:///path/to/docker.sock`, always with an absolute path
    Unix(String),
    /// `tcp://host:port` or `http://host:port`
    Http(String),
}

impl FromStr for Endpoint {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        // `unix://var/run/docker.sock` is a common spelling of the default socket.
        if let Some(path) = value.strip_prefix("unix://")
            && !path.trim_start_matches('/').is_empty()
        {
            return Ok(Self::Unix(format!("unix:///{}", path.trim_start_matches('/'))));
        }
        if let Some(addr) = value
            .strip_prefix("tcp://")
            .or_else(|| value.strip_prefix("http://"))
            && let Some((host, port)) = addr.trim_end_matches('/').rsplit_once(':')
            && !host.is_empty()
            && port.parse::<u16>().is_ok()
        {
            return Ok(Self::Http(value.to_string()));
        }
        Err(EngineError::MalformedEndpoint(value.to_string()))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Unix(ref addr) | Self::Http(ref addr) => f.write_str(addr),
        }
    }
}

/// Engine client talking to a real Docker daemon.
#[derive(Debug, Clone)]
pub struct DockerEngine {
    endpoint: Endpoint,
    docker: Docker,
}

impl DockerEngine {
    /// Build a client for `endpoint`. This does not touch the network yet, use
    /// [`Engine::ping`] to verify reachability.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MalformedEndpoint`] if the address cannot be parsed, or
    /// [`EngineError::Connection`] if the client cannot be constructed.
    pub fn connect(endpoint: &str) -> Result<Self, EngineError> {
        let endpoint: Endpoint = endpoint.parse()?;
        let docker = match endpoint {
            Endpoint::Unix(ref addr) => {
                Docker::connect_with_unix(addr, REQUEST_TIMEOUT_SECS, API_DEFAULT_VERSION)
            }
            Endpoint::Http(ref addr) => {
                Docker::connect_with_http(addr, REQUEST_TIMEOUT_SECS, API_DEFAULT_VERSION)
            }
        }
        .map_err(|e| EngineError::Connection {
            endpoint: endpoint.to_string(),
            source: e.into(),
        })?;
        debug!(%endpoint, "Created engine client");
        Ok(Self { endpoint, docker })
    }

    /// Map a bollard error. Anything that isn't a response from the daemon is treated as a
    /// transport failure.
    fn map_error(&self, name: &str, context: &str, err: BollardError) -> EngineError {
        match err {
            BollardError::DockerResponseServerError {
                status_code: 404, ..
            } => EngineError::NotFound(name.to_string()),
            e @ BollardError::DockerResponseServerError { .. } => EngineError::request(context, e),
            e => EngineError::Connection {
                endpoint: self.endpoint.to_string(),
                source: e.into(),
            },
        }
    }

    async fn image_tags(&self, image_id: &str) -> Result<Vec<String>, EngineError> {
        match self.docker.inspect_image(image_id).await {
            Ok(image) => Ok(image.repo_tags.unwrap_or_default()),
            // Untagged images that got pruned still leave their containers behind.
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(Vec::new()),
            Err(e) => Err(self.map_error(image_id, "inspect image", e)),
        }
    }
}

#[async_trait]
impl Engine for DockerEngine {
    async fn ping(&self) -> Result<(), EngineError> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| EngineError::Connection {
                endpoint: self.endpoint.to_string(),
                source: e.into(),
            })
    }

    async fn version(&self) -> Result<VersionInfo, EngineError> {
        let raw = self
            .docker
            .version()
            .await
            .map_err(|e| self.map_error("", "version", e))?;
        Ok(VersionInfo {
            version: raw.version,
            api_version: raw.api_version,
            os: raw.os,
            arch: raw.arch,
            kernel: raw.kernel_version,
        })
    }

    async fn list_containers(&self, include_stopped: bool) -> Result<Vec<String>, EngineError> {
        let options = ListContainersOptions::<String> {
            all: include_stopped,
            ..Default::default()
        };
        let summaries = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| self.map_error("", "list containers", e))?;
        Ok(summaries
            .into_iter()
            .filter_map(|summary| {
                summary
                    .names
                    .and_then(|names| names.into_iter().next())
                    .map(|name| name.trim_start_matches('/').to_string())
            })
            .collect())
    }

    async fn inspect_container(&self, name: &str) -> Result<ContainerDetails, EngineError> {
        let inspect = self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
            .map_err(|e| self.map_error(name, "inspect container", e))?;
        let (status, started_at) = inspect.state.map_or_else(
            || (String::new(), None),
            |state| {
                (
                    state.status.map(|s| s.to_string()).unwrap_or_default(),
                    state.started_at,
                )
            },
        );
        let image_tags = match inspect.image {
            Some(ref image_id) => self.image_tags(image_id).await?,
            None => Vec::new(),
        };
        Ok(ContainerDetails {
            status,
            started_at,
            image_tags,
        })
    }

    async fn start_container(&self, name: &str) -> Result<(), EngineError> {
        self.docker
            .start_container(name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| self.map_error(name, "start container", e))
    }

    async fn stop_container(&self, name: &str, timeout: Duration) -> Result<(), EngineError> {
        let options = StopContainerOptions {
            t: i64::try_from(timeout.as_secs()).unwrap_or(i64::MAX),
        };
        self.docker
            .stop_container(name, Some(options))
            .await
            .map_err(|e| self.map_error(name, "stop container", e))
    }
}
