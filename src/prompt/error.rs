use thiserror::Error;

#[derive(Error, Debug)]
pub enum PromptError {
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Template render error in `{template}`: {message}")]
    TemplateRenderError { template: String, message: String },
}

impl PromptError {
    pub fn render(template: impl Into<String>, message: impl Into<String>) -> Self {
        PromptError::TemplateRenderError {
            template: template.into(),
            message: message.into(),
        }
    }
}
