pub mod config;
pub mod coordinator;
pub mod crawler;
pub mod dates;
pub mod models;
pub mod normalizer;
pub mod pipeline;
pub mod probe;
pub mod report;
pub mod selectors;
pub mod session;
pub mod settle;
pub mod surface;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use coordinator::{InterruptFlag, RunCoordinator, RunOutcome, RunPlan};
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
