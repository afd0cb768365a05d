//! Integration tests for the testsmith run-coordination layer

mod cache_integration;
mod config_integration;
mod end_to_end;
mod report_properties;
mod scheduler_isolation;
mod test_utils;
