//! Collaborators the pipeline calls between agent stages.

mod search;
pub use search::*;

mod script;
pub use script::*;

mod urls;
pub use urls::*;
