mod orchestrator;
mod response;

pub use orchestrator::Orchestrator;
pub use response::ProcessExecutionResponse;
