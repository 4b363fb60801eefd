pub mod message;
pub mod payload;
pub mod workflow;

pub use message::*;
pub use payload::*;
pub use workflow::*;
