//! Record sinks and run output.
//!
//! # Submodules
//!
//! - [`file`]: [`FileSink`] writes one JSON file per record
//! - [`api`]: [`ApiSink`] POSTs each record to the parks API
//! - [`json`]: writes the run's aggregate record list
//! - [`summary`]: renders the end-of-run summary
//!
//! Both sinks are publisher [`Subscriber`](crate::publish::Subscriber)s.
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── IL/
//! │   ├── starved-rock-state-park.json
//! │   └── matthiessen-state-park.json
//! └── IN/
//!     └── indiana-dunes-state-park.json
//! ```

pub mod api;
pub mod file;
pub mod json;
pub mod summary;

pub use api::ApiSink;
pub use file::FileSink;
