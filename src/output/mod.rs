//! Output module for crawl reports
//!
//! This module handles:
//! - Accumulating per-page outcomes into a crawl report
//! - Printing the final summary

mod report;

pub use report::{print_report, CrawlReport, ReportBuilder};
