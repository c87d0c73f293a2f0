//! Adapters for external systems.
//!
//! - `site`: the static site generator subprocess
//! - `openai`: OpenAI-compatible chat completions and transcription

pub mod openai;
pub mod site;

pub use openai::OpenAiClient;
pub use site::{CommandSiteGenerator, RegenerationError, SiteGenerator};
