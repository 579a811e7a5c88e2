//! Website change monitoring engine.
//!
//! Periodically fetches a set of registered URLs, fingerprints each response
//! body and records whether the content changed since the previous check.
//!
//! # Components
//!
//! - **Registry**: thread-safe store of targets and the id counter
//! - **ClientFactory**: HTTP clients, with per-target mutual-TLS material
//! - **detector**: body fingerprints and the change decision
//! - **CheckExecutor**: one check for one target, failures folded into state
//! - **Scheduler**: concurrent sweeps over all targets on a fixed period
//! - **Monitor**: the command/query surface tying the above together
//!
//! # Example
//!
//! ```no_run
//! use sitewatch::{Monitor, MonitorConfig, NewTarget};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let monitor = Monitor::builder(MonitorConfig::default()).build()?;
//!
//! let target = monitor
//!     .create_target(NewTarget::new("https://example.com").with_name("Example"))
//!     .await?;
//!
//! let _sweeper = monitor.scheduler().start();
//!
//! if let Some((checked, outcome)) = monitor.check_now(target.id).await {
//!     println!("{} -> {} (changed: {})", checked.url, outcome, checked.has_changed);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod detector;
pub mod executor;
pub mod monitor;
pub mod registry;
pub mod scheduler;
pub mod types;

pub use client::{ClientError, ClientFactory};
pub use executor::{CheckExecutor, CheckListener, CheckOutcome, PersistHook};
pub use monitor::{Monitor, MonitorBuilder};
pub use registry::{Registry, RegistryError};
pub use scheduler::{Scheduler, SweepListener, SweepReport};
pub use types::{MonitorConfig, NewTarget, Target, TargetId, TlsConfig};
