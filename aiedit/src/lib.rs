//! aiedit — progressive edit session engine.
//!
//! Applies a code-generation agent's streamed text edits to in-memory
//! buffers: strictly ordered per file, concurrent across files, grouped
//! into per-turn iterations that roll back atomically, with a live
//! original-vs-working line diff per touched file driving accept/reject
//! review.
//!
//! # Wiring
//!
//! The host owns an [`event::EventHandler`] and a [`registry::SessionRegistry`]:
//!
//! ```no_run
//! use aiedit::config::EngineConfig;
//! use aiedit::event::EventHandler;
//! use aiedit::registry::SessionRegistry;
//!
//! # async fn wire() -> Result<(), aiedit_core::error::EngineError> {
//! let handler = EventHandler::new();
//! let registry = SessionRegistry::new(EngineConfig::default(), handler.tx.clone());
//!
//! let session = registry.create(Some("req-1"))?;
//! session.open_resource("src/main.rs", "fn main() {}")?;
//! // ... feed TextEditBatch values via registry.dispatch(...) or
//! // session.apply_progress(...), drain handler.rx for review events.
//! # Ok(())
//! # }
//! ```
//!
//! Inbound batches arrive through [`registry::SessionRegistry::dispatch`];
//! everything the engine has to say flows back through the closed
//! [`event::SessionEvent`] enum.

pub mod config;
pub mod event;
pub mod ledger;
pub mod queue;
pub mod registry;
pub mod session;

pub use aiedit_core as core;

pub use config::EngineConfig;
pub use event::{EventHandler, SessionEvent};
pub use registry::SessionRegistry;
pub use session::EditSession;
