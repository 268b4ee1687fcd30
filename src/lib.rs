pub mod api;
pub mod chart;
pub mod config;
pub mod dashboard;
pub mod dataset;
pub mod error;
pub mod format;
pub mod hosts;
pub mod models;
pub mod oui;
pub mod poller;
pub mod source;
pub mod terminal;
pub mod view;

pub use error::{MonitorError, Result};
