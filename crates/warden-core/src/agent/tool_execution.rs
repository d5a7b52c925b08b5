use tracing::Instrument;
use warden_llm::{LlmProvider, Message, ToolCallRequest};
use warden_tools::result_record;

use super::Agent;

impl<P: LlmProvider> Agent<P> {
    /// Run each call in order and append one tool message per call.
    ///
    /// Errors become `{"success": false, "error": ...}` records so the model can react.
    pub(super) async fn execute_tool_calls(&mut self, calls: &[ToolCallRequest]) {
        for call in calls {
            let span = tracing::info_span!("tool_exec", tool = %call.name, call_id = %call.id);
            let result = self
                .registry
                .execute(&call.name, &call.arguments)
                .instrument(span)
                .await;

            match &result {
                Ok(_) => tracing::debug!(tool = %call.name, "tool call succeeded"),
                Err(e) => tracing::info!(tool = %call.name, error = %e, "tool call failed"),
            }

            let record = result_record(&result);
            self.messages
                .push(Message::tool_result(call.id.as_str(), record.to_string()));
        }
    }
}
