#![allow(dead_code, unused_imports)]

//! The planning layer: the LLM transport contract, the bounded-retry
//! `Planner`, and cron-schedule validation for the planner's optional
//! `cronSchedule` (§4.1, §4.4, §6).

pub mod llm;
pub mod planner;
pub mod scheduler;

pub use llm::{
    extract_json_block, parse_llm_json, ChatMessage, ChatRequest, ChatResponse, FinishReason,
    LLMProvider, ProviderKey,
};
pub use planner::{CreateFromGoalOptions, Planner, PlanningResult};
pub use scheduler::{human_readable_cron, summarize_scheduled, validate_cron, ScheduledDagSummary};
