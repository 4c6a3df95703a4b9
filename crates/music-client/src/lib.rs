//! Coordination engine of the music library client.
//!
//! Requests go through the [`gateway::RequestGateway`]; `"all"` searches fan
//! out over every provider via [`fanout::FanoutAggregator`]; background state
//! (download tasks, the task badge, QR login sessions) is kept current by
//! [`polling::PollLoop`] instances.  [`app::App`] ties these to user actions
//! and publishes everything the front end shows as [`action::UiEvent`]s.

pub mod action;
pub mod app;
pub mod app_state;
pub mod batch;
pub mod busy;
pub mod cli;
pub mod download_manager;
pub mod error;
pub mod fanout;
pub mod gateway;
pub mod http;
pub mod polling;
pub mod qr_login;
pub mod sink;
pub mod source;
pub mod toast;

#[cfg(test)]
mod testing;
