//! Turns a research query into an emailed report.
//!
//! A run plans a set of web searches, performs them concurrently, writes a
//! markdown report from whatever searches succeeded and emails it. Progress
//! is observed through the stream returned by [`Pipeline::run`].

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod server;
pub mod tasks;
pub mod tools;

pub use config::Config;
pub use error::{CallError, ConfigError, DeliveryError, StageError};
pub use models::{ProgressEvent, Report, SearchDirective, SearchPlan, SearchResult, Stage};
pub use pipeline::Pipeline;
pub use progress::ProgressStream;
