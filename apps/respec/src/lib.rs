//! # respec - THE BINARY (library surface)
//!
//! Exposes the API and CLI modules so integration tests can drive the
//! router and handlers without a running server.

pub mod api;
pub mod cli;
pub mod config;
