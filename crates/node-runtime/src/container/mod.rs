//! # Subsystem Container
//!
//! Configuration loading and the container that wires the observer and
//! crosschain subsystems over one store.

pub mod config;
pub mod subsystems;

pub use config::{ConfigError, NodeConfig, ReplayConfig};
pub use subsystems::{
    ConcreteCrossChainService, ConcreteObserverService, ContainerError, SubsystemContainer,
};
