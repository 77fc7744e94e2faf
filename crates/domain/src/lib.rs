//! Shared types for the driftguard workspace: the error type, the config
//! tree, structured trace events and the wire-independent model of agent
//! actions and drift judgments.

pub mod action;
pub mod config;
pub mod drift;
pub mod error;
pub mod task;
pub mod trace;

pub use error::{Error, Result};
