// Migration orchestration core shared by the API binary and embedding hosts

pub mod bootstrap;
pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod executor;
pub mod job;
pub mod models;
pub mod registry;
pub mod retry;
pub mod telemetry;
pub mod validation;

pub use dispatcher::{Dispatcher, JobHandle};
pub use executor::MigrationExecutor;
pub use job::{JobSubscription, MigrationJob};
pub use registry::ExecutorRegistry;
