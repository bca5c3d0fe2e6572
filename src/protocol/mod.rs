//! Stream protocol: NDJSON framing, record classification, tolerant
//! chunk parser, and outbound stdin envelopes.

pub mod codec;
pub mod events;
pub mod outbound;
pub mod parser;

pub use codec::NdjsonCodec;
pub use events::{is_end_of_turn, ControlRequest, StreamRecord};
pub use parser::{StreamObserver, StreamParser};
