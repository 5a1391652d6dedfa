//! The web search workflow: three agents chained with two searches.

mod config;
pub use config::*;

mod search_pipeline;
pub use search_pipeline::*;

mod task;
pub use task::*;

#[cfg(test)]
mod tests;
