// Bridge between wire bytes and models: the wire-format helpers and the
// chain stage that parses requests into models and encodes model results.

pub mod bridge;
pub mod format;

pub use bridge::{encode_response, ParsedRequest, SerializationStage};
pub use format::{JsonFormat, WireFormat};
