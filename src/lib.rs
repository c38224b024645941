//! # connect-samples
//!
//! Interactive live-session client for a scene-description content server.
//!
//! The crate wires three cooperating pieces around an external content and
//! channel client: a command dispatcher reading one line at a time, a
//! live-update pump that publishes local edits and pulls remote ones, and a
//! channel listener that turns the client's event callbacks into console
//! output and process flags.
//!
//! ## Architecture
//!
//! ```text
//! stdin / argv
//!     │
//!     ├── Repl + CommandRegistry (cli/)
//!     ├── built-in commands (commands/)
//!     │
//!     ├── SampleContext (context)
//!     │     ├── LivePump + workers (live/)
//!     │     └── ChannelListener (session/)
//!     │
//!     └── LiveClient / LiveDocument (client/)
//!           └── in-process MemoryServer (client/memory/)
//! ```
//!
//! Client callbacks run on threads owned by the client. They never touch
//! shared state directly: document updates raise an [`live::UpdateSignal`],
//! channel events go through a bounded queue into the listener task.

pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod console;
pub mod context;
pub mod error;
pub mod live;
pub mod logging;
pub mod scene;
pub mod session;
