pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod generator;
pub mod llm;
pub mod providers;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use error::{ProviderError, ResearchError};
pub use generator::research::{ResearchResult, deep_research};
pub use generator::workflow::launch;
