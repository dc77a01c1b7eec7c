//! Domain types, configuration and run-scoped primitives

pub mod cancel;
pub mod checkpoint;
pub mod config;
pub mod lock;
pub mod models;
