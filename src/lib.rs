//! Testsmith: API Test Artifact Generation
//!
//! Turns an API specification into tabular test cases, scenario feature files and a
//! request collection. A run acquires its inputs through a content-addressed upload
//! cache, plans sections, fans generator tasks out per section and kind, folds the
//! collection contributions into one bundle, and compiles a single run report.

pub mod agent;
pub mod cache;
pub mod cli;
pub mod config;
pub mod consolidator;
pub mod error;
pub mod logging;
pub mod provider;
pub mod report;
pub mod run;
pub mod scheduler;
pub mod section;
pub mod types;
