//! Language-model extraction of exhibition records from venue pages.
//!
//! - [`ExtractionClient`] sends one chat-completion request per page
//! - [`parse_exhibitions`] strips code fences and decodes the JSON array
//! - [`build_prompt`] renders the fixed instructions around the page content

pub mod client;
pub mod parse;
pub mod prompt;

pub use client::ExtractionClient;
pub use parse::{parse_exhibitions, strip_code_fence};
pub use prompt::{SYSTEM_PROMPT, build_prompt};
