use async_trait::async_trait;

use crate::{agent::AgentError, console::ConsoleReporter, monitoring::MonitoringTrace};

/// A unit of work that announces itself, runs, and reports how it ended.
#[async_trait]
pub trait Task: Send {
    type Output: Send;

    fn title(&self) -> String {
        "Initializing ...".to_string()
    }

    fn context(&self) -> String {
        "Context ...".to_string()
    }

    fn finished_success(&self) -> String {
        "Finish success".to_string()
    }

    fn finished_failed(&self) -> String {
        "Finish with errors ...".to_string()
    }

    async fn resolve(&mut self, trace: &MonitoringTrace) -> Result<Self::Output, AgentError>;
}

/// Print the title and context, resolve the task, then print the success or
/// failure message.
pub async fn run_task<T: Task>(
    task: &mut T,
    trace: &MonitoringTrace,
    reporter: &ConsoleReporter,
) -> Result<T::Output, AgentError> {
    reporter.title(&task.title());
    reporter.context(&task.context());

    match task.resolve(trace).await {
        Ok(output) => {
            reporter.success(&task.finished_success());
            Ok(output)
        }
        Err(e) => {
            reporter.failure(&format!("{} {}", task.finished_failed(), e));
            Err(e)
        }
    }
}
