pub mod agent_executor;
pub mod context;
pub mod research;
pub mod workflow;
