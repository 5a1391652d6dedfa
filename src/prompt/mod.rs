//! Template rendering for agent prompts.
//!
//! Templates are a small Jinja subset: `{{ path | filter }}` expressions,
//! `{% for %}` and `{% if %}` blocks, and `{# comments #}`. A `-` inside any tag
//! delimiter (`{{-`, `-%}`) trims the whitespace on that side. Filters are owned
//! by a [`PromptRenderer`] instance, never registered globally.

mod error;
pub use error::*;

mod store;
pub use store::*;

mod template;
pub use template::*;

mod renderer;
pub use renderer::*;

use std::collections::HashMap;

use serde_json::Value;

/// Context handed to a template: field name to JSON value.
pub type PromptArgs = HashMap<String, Value>;

#[macro_export]
macro_rules! prompt_args {
    ( $($key:expr => $value:expr),* $(,)? ) => {
        {
            #[allow(unused_mut)]
            let mut args = $crate::prompt::PromptArgs::new();
            $(
                args.insert($key.to_string(), serde_json::json!($value));
            )*
            args
        }
    };
}
