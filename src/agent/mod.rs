mod agent;
pub use agent::*;

mod builder;
pub use builder::*;

mod config;
pub use config::*;

mod error;
pub use error::*;

pub mod parsing;
pub use parsing::*;
