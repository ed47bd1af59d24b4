pub mod artifact;
pub mod config;
pub mod fetch;
pub mod pipeline;
pub mod process;
pub mod schema;
