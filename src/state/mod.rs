// src/state/mod.rs
//
// Playback state and settings.
//
// This module contains the structures describing *what* the transport is
// doing: the commands callers send, the transport state and the session
// that bundles it with the voice registry and graph, the configuration,
// and the read-only snapshot handed back to UIs.
//
// Key principles:
// - Exactly one PlaybackSession exists per transport; nothing is global
// - Mutations happen through the TransportController (directly or via Commands)
// - UIs only ever see PlaybackReadback copies

mod command;
mod config;
mod session;

pub use command::*;
pub use config::*;
pub use session::*;
