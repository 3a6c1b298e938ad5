//! Judge provider adapters
//!
//! Each adapter speaks one vendor's wire protocol and normalises the reply
//! into a `RawReply` at this boundary.

pub mod anthropic;
pub mod openai;
mod common;

pub use anthropic::AnthropicJudgeProvider;
pub use common::UserAgent;
pub use openai::OpenAIJudgeProvider;

use std::sync::Arc;

use crate::config::{ProviderConfig, ProviderKind};
use crate::core::JudgeProvider;
use crate::error::Result;

/// Build the adapter matching `config.kind`
pub fn build_provider(config: ProviderConfig) -> Result<Arc<dyn JudgeProvider>> {
    Ok(match config.kind {
        ProviderKind::OpenAI => Arc::new(OpenAIJudgeProvider::new(config)?),
        ProviderKind::Anthropic => Arc::new(AnthropicJudgeProvider::new(config)?),
    })
}
