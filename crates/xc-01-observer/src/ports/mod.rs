//! Ports layer for the Observer subsystem

pub mod inbound;

pub use inbound::ObserverApi;
