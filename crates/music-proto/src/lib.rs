//! Shared types for the music library client: the `/api/` wire format, the
//! static provider table, configuration and the persisted preference.

pub mod config;
pub mod platform;
pub mod protocol;
pub mod providers;
pub mod songs;
pub mod state;
