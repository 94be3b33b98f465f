//! Shipped [`Agent`](crate::agent::Agent) implementations.

pub mod command;

pub use command::CommandAgent;
