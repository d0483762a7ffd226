//! One [`Collector`](crate::metrics::traits::Collector) per data source.

pub mod external;
pub mod host;
pub mod network;
pub mod process;
pub mod thermal;

pub use external::{ExternalTool, ExternalToolsCollector};
pub use host::HostCollector;
pub use network::NetworkCollector;
pub use process::ProcessCollector;
pub use thermal::ThermalCollector;
