//! Shared runtime helpers for the datastore workspace.

pub mod utils;
pub mod env;
