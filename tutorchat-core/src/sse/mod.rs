//! Server-Sent-Events plumbing for the chat backend.
//!
//! The backend streams `data: {...}` lines over a chunked HTTP body. This
//! module splits the byte stream into complete lines ([`decoder`]) and
//! classifies each line into typed stream events ([`parser`]). Folding events
//! into a message draft lives in [`crate::reducer`].

pub mod decoder;
pub mod parser;

pub use decoder::FrameDecoder;
pub use parser::{ParseOutcome, StreamEvent, parse_line};
