mod error;
pub use error::*;

mod model;
pub use model::*;

mod provider;
pub use provider::*;

pub mod bedrock;
pub mod openai;
