//! Crawl driver: breadth-first walk over advertised peer lists

mod engine;

pub use engine::{AttemptError, CrawlConfig, CrawlEnd, CrawlReport, Crawler};
