//! Coloured console output for prompts, replies and task progress.

use owo_colors::{OwoColorize, Style};

const RULE: &str = "####################";

/// Prints to stdout when `verbose`, otherwise stays silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsoleReporter {
    verbose: bool,
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self { verbose: true }
    }
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub fn quiet() -> Self {
        Self::new(false)
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn prompt(&self, prompt: &str) {
        self.emit(&banner("PROMPT", prompt), Style::new().bright_blue());
    }

    pub fn response(&self, response: &str) {
        self.emit(&format!("{}\n", banner("RESPONSE", response)), Style::new().blue().bold());
    }

    pub fn title(&self, title: &str) {
        self.emit(&format!("\n\n{}", title), Style::new().bright_white());
    }

    pub fn context(&self, context: &str) {
        self.emit(context, Style::new().bold());
    }

    pub fn success(&self, message: &str) {
        self.emit(message, Style::new().green().bold());
    }

    pub fn failure(&self, message: &str) {
        self.emit(message, Style::new().red().bold());
    }

    pub fn executing(&self, code: &str) {
        self.emit(&format!("Executing \n{}", code), Style::new().bright_white());
    }

    pub fn script_output(&self, output: &str) {
        let text = if output.is_empty() { "Success" } else { output };
        self.emit(text, Style::new().bright_green());
    }

    fn emit(&self, text: &str, style: Style) {
        if self.verbose {
            println!("{}", text.style(style));
        }
    }
}

/// `#### LABEL ####` block around `body`.
pub fn banner(label: &str, body: &str) -> String {
    format!(
        "\n\n{rule} {label} {rule}\n{body}\n{rule} END {label} {rule}\n",
        rule = RULE,
        label = label,
        body = body
    )
}
