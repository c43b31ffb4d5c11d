//! Expect engine: pattern matching over a live device stream.
//!
//! Device CLIs emit output in unpredictable chunk sizes, echo input and
//! print prompts only after several reads. The engine accumulates every
//! received byte, retries the match after each read and tracks how much
//! output earlier matches already consumed.

mod buffer;
mod engine;
mod patterns;

pub use buffer::ExpectBuffer;
pub use engine::{EngineConfig, EngineState, ExpectEngine, ExpectMatch};
pub use patterns::Pattern;
