//! vidacquire - media acquisition pipeline for bot-protected video hosts.
//!
//! Periodically scans configured channels, resolves direct media URLs
//! through a shared challenge-solver session, downloads assets with atomic
//! finalization, and optionally forwards them to a messaging upload API.

pub mod automation;
pub mod browser;
pub mod cli;
pub mod config;
pub mod download;
pub mod fetch;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod repository;
pub mod scanner;
pub mod solver;
pub mod upload;
pub mod utils;
