use std::{collections::HashMap, sync::Arc};

use serde_json::Value;

use super::{
    display_value, EmbeddedTemplateStore, Filter, PromptArgs, PromptError, Template, TemplateStore,
};

/// Name of the filter templates apply to free-text values.
pub const ESCAPE_FILTER: &str = "s";

/// Doubles every brace so text from a context value can never read as template syntax.
pub fn escape_braces(text: &str) -> String {
    text.replace('{', "{{").replace('}', "}}")
}

/// Renders named templates from a [`TemplateStore`].
///
/// The `s` (brace escaping), `trim` and `tojson` filters are registered when the
/// renderer is built; more can be added with [`PromptRenderer::with_filter`].
pub struct PromptRenderer {
    store: Box<dyn TemplateStore>,
    filters: HashMap<String, Filter>,
}

impl PromptRenderer {
    pub fn new<S: TemplateStore + 'static>(store: S) -> Self {
        let mut filters: HashMap<String, Filter> = HashMap::new();
        filters.insert(
            ESCAPE_FILTER.to_string(),
            Arc::new(|value: &Value| Value::String(escape_braces(&display_value(value)))),
        );
        filters.insert(
            "trim".to_string(),
            Arc::new(|value: &Value| Value::String(display_value(value).trim().to_string())),
        );
        filters.insert(
            "tojson".to_string(),
            Arc::new(|value: &Value| Value::String(value.to_string())),
        );

        Self {
            store: Box::new(store),
            filters,
        }
    }

    /// Register an extra filter, replacing any filter with the same name.
    pub fn with_filter<N, F>(mut self, name: N, filter: F) -> Self
    where
        N: Into<String>,
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.filters.insert(name.into(), Arc::new(filter));
        self
    }

    pub fn has_filter(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    /// Load `template_name` from the store and render it with `context`.
    pub fn render(&self, template_name: &str, context: &PromptArgs) -> Result<String, PromptError> {
        let source = self.store.get(template_name)?;
        self.render_source(template_name, &source, context)
    }

    /// Render template text that did not come from the store.
    pub fn render_source(
        &self,
        template_name: &str,
        source: &str,
        context: &PromptArgs,
    ) -> Result<String, PromptError> {
        let template = Template::parse(template_name, source)?;
        template.render(context, &self.filters)
    }
}

impl Default for PromptRenderer {
    /// Renderer over the templates compiled into the binary.
    fn default() -> Self {
        Self::new(EmbeddedTemplateStore::default())
    }
}

impl std::fmt::Debug for PromptRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut filters: Vec<&String> = self.filters.keys().collect();
        filters.sort();
        f.debug_struct("PromptRenderer")
            .field("filters", &filters)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        prompt::{EmbeddedTemplateStore, RESULTS_SELECTION_TEMPLATE, TERMS_TO_SEARCH_TEMPLATE},
        prompt_args,
    };
    use serde_json::json;

    fn renderer() -> PromptRenderer {
        PromptRenderer::new(
            EmbeddedTemplateStore::default()
                .with_template("echo.jinja", "Request: {{ input | s }} ({% if input %}set{% endif %})")
                .with_template("raw.jinja", "{{ input }}"),
        )
    }

    #[test]
    fn test_escape_braces() {
        assert_eq!(escape_braces("a {b} c"), "a {{b}} c");
        assert_eq!(escape_braces("no braces"), "no braces");
    }

    #[test]
    fn test_escape_filter_keeps_control_syntax() {
        let out = renderer()
            .render("echo.jinja", &prompt_args! { "input" => "price {x} of {% if y %}" })
            .unwrap();
        assert_eq!(out, "Request: price {{x}} of {{% if y %}} (set)");
    }

    #[test]
    fn test_unescaped_value_is_literal() {
        let out = renderer()
            .render("raw.jinja", &prompt_args! { "input" => "{{ input }}" })
            .unwrap();
        assert_eq!(out, "{{ input }}");
    }

    #[test]
    fn test_template_not_found() {
        let err = renderer().render("missing.jinja", &PromptArgs::new()).unwrap_err();
        assert!(matches!(err, PromptError::TemplateNotFound(name) if name == "missing.jinja"));
    }

    #[test]
    fn test_missing_variable_is_render_error() {
        let err = renderer()
            .render(TERMS_TO_SEARCH_TEMPLATE, &PromptArgs::new())
            .unwrap_err();
        assert!(matches!(err, PromptError::TemplateRenderError { .. }));
    }

    #[test]
    fn test_unknown_filter_is_render_error() {
        let err = renderer()
            .render_source("inline", "{{ input | shout }}", &prompt_args! { "input" => "hi" })
            .unwrap_err();
        assert!(matches!(err, PromptError::TemplateRenderError { .. }));
    }

    #[test]
    fn test_custom_filter() {
        let renderer = renderer().with_filter("shout", |v: &Value| {
            Value::String(display_value(v).to_uppercase())
        });
        assert!(renderer.has_filter("shout"));
        let out = renderer
            .render_source("inline", "{{ input | trim | shout }}", &prompt_args! { "input" => "  hi " })
            .unwrap();
        assert_eq!(out, "HI");
    }

    #[test]
    fn test_results_selection_template() {
        let context = prompt_args! {
            "input" => "llama 3 {price}",
            "results" => json!([
                {"url": "https://aws.amazon.com/bedrock/pricing/", "title": "Bedrock pricing", "description": "Pay {per} token"},
            ]),
        };
        let out = renderer().render(RESULTS_SELECTION_TEMPLATE, &context).unwrap();
        assert!(out.contains("llama 3 {{price}}"));
        assert!(out.contains("URL: https://aws.amazon.com/bedrock/pricing/"));
        assert!(out.contains("Pay {{per}} token"));
    }
}
