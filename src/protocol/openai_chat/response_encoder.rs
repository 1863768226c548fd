use crate::stream::AggregateState;

use super::{
    AssistantMessage, ChatCompletionChoice, ChatCompletionResponse, ChatCompletionUsage,
    CHAT_COMPLETION_OBJECT, FINISH_REASON_STOP,
};

/// Encode the drained aggregate into a `chat.completion` object.
///
/// `content` carries the think-block composite when reasoning is present;
/// `reasoning_content` carries the raw reasoning, empty when there was none.
#[must_use]
pub fn encode_chat_completion(
    id: &str,
    model: &str,
    created: u64,
    aggregate: &AggregateState,
) -> ChatCompletionResponse {
    ChatCompletionResponse {
        id: id.to_string(),
        object: CHAT_COMPLETION_OBJECT.to_string(),
        created,
        model: model.to_string(),
        choices: vec![ChatCompletionChoice {
            index: 0,
            message: AssistantMessage {
                role: "assistant".to_string(),
                content: aggregate.final_content(),
                reasoning_content: aggregate.reasoning_text().to_string(),
            },
            finish_reason: FINISH_REASON_STOP.to_string(),
        }],
        usage: ChatCompletionUsage::default(),
    }
}
