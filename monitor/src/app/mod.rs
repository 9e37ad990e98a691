mod cache;
mod config_watcher;
mod container;
mod notifier;
mod runtime;
mod startup;
mod state;

pub use cache::{ContainerMap, HostCache, InvalidInterval, PollSummary, SetupError};
pub use container::{ContainerInfo, ContainerRecord, DEFAULT_STOP_TIMEOUT, TimestampError};
pub use notifier::{HostEvent, Notifier, SubscriptionToken};
pub use runtime::{Poller, Renderer};

pub(crate) use startup::{shutdown_signal, start};
pub(crate) use state::start_host;
