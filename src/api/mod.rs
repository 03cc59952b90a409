// Protocol-neutral request and response values exchanged with the handler chain

pub mod request;
pub mod response;

pub use request::{RequestView, RequestViewBuilder};
pub use response::{Body, Response, ResponseHeaders};
