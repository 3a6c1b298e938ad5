//! Cross-module tests for the Judge SDK
//!
//! Unit tests live next to the code they cover; these exercise several
//! components together.

pub mod anthropic_mock_tests;
pub mod fallback_tests;
