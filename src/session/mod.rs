//! Session/channel listener: event classification, the listener state
//! machine and live-session messages.

pub mod listener;
pub mod message;
pub mod payload;
pub mod state;

pub use listener::{ChannelListener, MERGE_EXIT_NOTICE};
pub use message::{MessageType, SessionMessage};
pub use payload::Payload;
pub use state::{ListenerState, SessionState};
