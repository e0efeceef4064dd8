//! Inbound message handling: access control, slash commands and dispatch of
//! conversation turns to the agent pool.

pub mod commands;
pub mod dispatcher;
pub mod error;
pub mod gate;

pub use {
    commands::Command,
    dispatcher::{ChatDispatcher, Dispatched},
    error::{Error, Result},
    gate::AuthGate,
};
