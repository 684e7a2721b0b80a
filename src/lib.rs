// ABOUTME: Library root for safeship - exposes public types for testing.
// ABOUTME: The main binary is in main.rs.

pub mod audit;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod exec;
pub mod firewall;
pub mod health;
pub mod lock;
pub mod output;
pub mod release;
pub mod snapshot;
pub mod supervisor;
pub mod types;
