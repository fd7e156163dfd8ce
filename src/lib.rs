//! Relais is a chat client core that relays conversations across remote LLM
//! providers, falling over to the next usable model when the active one fails.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the domain logic: the model catalog and strategy
//!   selection, provider dispatch, the conversation turn loop, and the
//!   persisted chat store and settings.
//! - [`api`] defines the wire payloads exchanged with providers and the
//!   remote catalog/whitelist fetchers.
//! - [`cli`] implements the command surface (interactive chat, one-shot
//!   `say`, and model listing).
//! - [`utils`] holds URL and authentication helpers shared by the layers
//!   above.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::run`].

pub mod api;
pub mod cli;
pub mod core;
pub mod utils;
