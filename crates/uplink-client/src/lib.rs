pub mod commands;
pub mod config;
pub mod error;
pub mod manager;
pub mod rest;
pub mod session;
pub mod transport;
