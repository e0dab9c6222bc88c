//! Progress streaming port: the sole contract to the UI-facing layer.
//!
//! Every completed step is pushed as it finishes; the final emission of
//! a batch carries `is_last = true`, signaling end-of-stream.

use async_trait::async_trait;

use crate::exec::ProcessExecutionResponse;

#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub response: ProcessExecutionResponse,
    pub correlation_id: String,
    /// 0-based position of the step within its batch
    pub step_index: usize,
    pub is_last: bool,
}

#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn publish(&self, update: ProgressUpdate);
}
