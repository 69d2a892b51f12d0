//! Batch classification job service
//!
//! Accepts batch classification jobs over HTTP, fans each job out as one
//! queue message per item, and reconciles the workers' at-least-once status
//! notifications into a single job record stored in PostgreSQL.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
pub mod shutdown;
pub mod telemetry;
