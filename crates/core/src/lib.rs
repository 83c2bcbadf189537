//! Core logic of the chat service: the query pipeline, prompt assembly,
//! citation extraction, error classification and the event wire format.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod citation;
pub mod conversation;
mod error;
pub mod event;
mod model_client;
mod pipeline;
pub mod prompt;
mod reformulate;
mod retrieval;
pub mod wire;

pub use citation::extract_citations;
pub use error::{PipelineError, classify};
pub use pipeline::*;
pub use retrieval::{Chunk, source_from_location};
