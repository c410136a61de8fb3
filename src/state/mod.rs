//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlPhase`: the coordinator's lifecycle (idle, dispatching, awaiting, finalizing, done)

mod crawl_phase;

pub use crawl_phase::CrawlPhase;
