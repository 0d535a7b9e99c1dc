//! HTTP edge and process state for the cc-proxy LLM gateway. Split into a
//! library target (this crate) and a thin `main.rs` binary so integration
//! tests can build an [`app_state::AppState`] and drive the handlers
//! directly, without a bin-only crate hiding them from `tests/`.

pub mod app_state;
pub mod correlation;
pub mod edge;
pub mod error_response;
pub mod fallback;
pub mod logging;
