//! Integration test suites

mod concurrency;
mod lifecycle;
mod scenarios;
