//! Upstream collaborators
//!
//! The scan pipeline only talks to these through their traits, so each one can
//! be swapped (or stubbed in tests) without touching orchestration code.

pub mod crawler;
pub mod tabular;
pub mod model;
pub mod sink;

pub use crawler::{Crawler, CrawlRequest, Credentials, HttpCrawler};
pub use tabular::{CsvParser, TabularParser};
pub use model::ModelRegistry;
pub use sink::{AlertSink, LogSink, WebhookSink};
