//! # GST Harness Core
//!
//! Shared, I/O-free logic for GST Harness: data models, the ordered
//! record set with brute-force cosine ranking, the snapshot image,
//! classification parsing, and the prompt builders used by the
//! retrieval paths.
//!
//! This crate contains no tokio, HTTP, or filesystem dependencies. The
//! durable store, the watch pipeline and every external collaborator
//! live in the `gst-harness` app crate.

pub mod classify;
pub mod embedding;
pub mod models;
pub mod prompt;
pub mod store;
