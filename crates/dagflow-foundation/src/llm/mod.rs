pub mod provider;

pub use provider::{
    extract_json_block, parse_llm_json, ChatMessage, ChatRequest, ChatResponse, FinishReason,
    LLMProvider, ProviderKey,
};
