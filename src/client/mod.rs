//! Descriptor handling
//!
//! This module handles:
//! * The canonical settings model and its validation
//! * Connection-string parsing (all accepted textual forms)
//! * The structured-map descriptor form

mod connection_string;
mod settings;

pub use settings::{
    ConnectTarget, RouterCandidate, Routing, SessionSettings, TlsMaterial, DEFAULT_PORT,
    PRIORITY_MAX,
};
