//! Anthropic SSE event grammar (§4.8): event framing, the non-streaming →
//! SSE emitter, and the per-request streaming-state helpers shared by every
//! streaming wire-format transformer in `ccproxy-transformers`.

pub mod emitter;
pub mod events;
pub mod state;

pub use emitter::emit;
pub use events::{chunk_chars, frame_event, TEXT_CHUNK_CHARS, TOOL_INPUT_CHUNK_CHARS};
