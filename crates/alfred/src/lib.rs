pub mod agent;
pub mod bootstrap;
pub mod config;
pub mod errors;
pub mod evaluation;
pub mod guests;
pub mod models;
pub mod prompt_template;
pub mod providers;
pub mod retriever;
pub mod session;
pub mod telemetry;
pub mod tools;
