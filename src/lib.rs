//! autotag - FTPS photo drop with voice-driven sharing
//!
//! A camera or phone uploads photos over explicit FTPS into today's album.
//! Every finished upload is routed by media kind:
//!
//! - Images rebuild the static site and refresh the album listings
//! - Voice notes (`.WAV`) are transcribed and handed to a tool-calling
//!   agent that acts on the photo of the same name, then deleted
//!
//! # Modules
//!
//! - `server`: FTPS control/data sessions, login, passive ports
//! - `library`: Album provisioning and `data.json` manifests
//! - `core`: Dispatcher, image and voice pipelines, safety limits
//! - `ingest`: Transcription backends
//! - `agent`: Photo agent state machine and its tools
//! - `adapters`: OpenAI-compatible API client and site generator
//! - `domain`: Album and upload types
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run the upload server
//! USER_PASSWORD=secret BASEURL=https://photos.example.com autotag serve
//!
//! # Try the agent on an existing photo
//! autotag agent --photo web/content/galleries/2024-03-05/IMG_1.JPG "share this with family"
//! ```

pub mod adapters;
pub mod agent;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod ingest;
pub mod library;
pub mod server;

// Re-export main types at crate root for convenience
pub use agent::{AgentError, AgentInvocation, AgentOutcome, AgentRunner, PhotoAgent};
pub use core::{Dispatched, Dispatcher, ImagePipeline, PipelineError, VoicePipeline};
pub use domain::{Album, AlbumSource, MediaKind, TransferEvent, UploadCompleted};
pub use library::{AlbumProvisioner, ManifestGenerator};
pub use server::TransferServer;
