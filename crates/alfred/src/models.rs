//! These models represent the objects passed around by the agent
//!
//! There are a few related formats we need to interact with:
//! - openai messages/tools, sent from the agent to the LLM
//! - vercel streaming protocol messages, sent from the server to the browser
//! - jsonl session transcripts, written by the cli
//!
//! We always immediately convert those data models into the internal structs using
//! to/from helpers, so the internal models are not an exact match to any of these formats.
pub mod message;
pub mod role;
pub mod tool;
