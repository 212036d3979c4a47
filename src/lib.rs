pub mod accounts;
pub mod cleanup;
pub mod cli;
pub mod config;
pub mod core;
pub mod exit;
pub mod health;
pub mod platform;
pub mod provision;
pub mod roster;
pub mod ui;
