//! An abstraction layer for the services the chat pipeline depends on.
//!
//! This crate establishes an unified protocol for the pipeline to interact
//! with text-generation models and knowledge-base retrievers, so that the
//! pipeline can switch between backends (or fakes in tests) without
//! modifying the core codebase.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to.

#![deny(missing_docs)]

mod error;
mod provider;
mod request;
mod response;
mod retriever;

pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;
pub use retriever::*;
