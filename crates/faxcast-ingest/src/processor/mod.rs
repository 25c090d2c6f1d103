//! Background materialization jobs.
//!
//! A [`FaxListProcessor`] decodes a confirmed file, maps its rows through the
//! confirmed [`ColumnMapping`](crate::types::ColumnMapping) in batches and
//! reports every step through its [`JobRegistry`]. Consumers follow progress by
//! holding a [`Subscription`] rather than polling.
//!
//! ```rust,ignore
//! let registry = JobRegistry::new();
//! let mut events = registry.subscribe();
//! let processor = FaxListProcessor::new(IngestConfig::default(), registry);
//!
//! let handle = processor.process_file(file, mapping)?;
//! for event in events.collect_job(handle.id()).await? {
//!     println!("{:>3}% {:?}", event.job.progress, event.kind);
//! }
//! let recipients = handle.wait().await?;
//! ```

mod events;
#[allow(clippy::module_inception)]
mod processor;
mod registry;

pub use events::{ClosureJobReporter, JobEvent, JobEventKind, JobReporter};
pub use processor::{FaxListProcessor, JobHandle};
pub use registry::{JobRegistry, Subscription};
