//! Forwarding-plane core: worker hot loop and startup dispatcher.

pub mod dispatcher;
pub mod worker;

pub use dispatcher::{run, DispatcherError};
