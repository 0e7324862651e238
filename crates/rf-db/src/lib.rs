//! rf-db: database access and persistence layer.
//!
//! SQLite-backed storage with connection pooling, embedded migrations, typed
//! models, and query modules for jobs, steps, and the trigger queue.

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
