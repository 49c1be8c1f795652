//! Background workers spawned beside the HTTP listener.

pub mod email_worker;
pub mod stream_worker;

pub use email_worker::EmailWorker;
pub use stream_worker::StreamWorker;
