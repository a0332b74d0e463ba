pub mod api;
pub mod app;
pub mod config;
pub mod deep_link;
pub mod error;
pub mod event;
pub mod model;
pub mod q4h;
pub mod registry;
pub mod run_control;
pub mod runtime;
pub mod source;
