//! Prompt-driven LLM agents for a small web research pipeline.
//!
//! An [`agent::PromptAgent`] renders a named template against a context, calls
//! the bound model, records the call as a generation under a Langfuse trace,
//! and normalizes the reply into the shape the next stage needs.
//! [`pipeline::SearchPipeline`] chains three such agents with two web searches.

pub mod agent;
pub mod console;
pub mod language_models;
pub mod monitoring;
pub mod pipeline;
pub mod prompt;
pub mod tools;
