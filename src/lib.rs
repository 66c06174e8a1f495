pub mod app;
pub mod cli;
pub mod client;
pub mod config;
pub mod constants;
pub mod errors;
pub mod navigator;
pub mod services;
pub mod ui;
pub mod utils;
