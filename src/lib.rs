pub mod app;
pub mod commands;
pub mod config;
pub mod controls;
pub mod fade;
pub mod frame;
pub mod host;
pub mod media;
pub mod memory;
pub mod plugin;
pub mod ramp;
pub mod scene;
pub mod settings_tab;
pub mod shell;
pub mod store;
pub mod target;
pub mod utils;
