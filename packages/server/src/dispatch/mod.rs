//! Job dispatch: correlation registry, reply listener, and the dispatcher.
//!
//! Control flow: `Dispatcher::submit` publishes a job onto the queue named
//! after its language with `reply_to` and `correlation_id` metadata, parks a
//! one-shot callback in the [`CorrelationRegistry`], and suspends. The
//! [`ReplyListener`] reads the shared reply queue and fires the matching
//! callback; a deadline timer bounds the wait.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod listener;
pub mod registry;

pub use config::DispatcherConfig;
pub use dispatcher::Dispatcher;
pub use error::DispatchError;
pub use listener::ReplyListener;
pub use registry::CorrelationRegistry;
