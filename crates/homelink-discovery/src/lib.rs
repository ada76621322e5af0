//! Homelink Discovery - Backend adapters, discovery and control dispatch
//!
//! This crate provides:
//! - The [`BackendAdapter`] trait and its three implementations (local
//!   network probe, short-range radio probe, hub entity registry)
//! - The discovery orchestrator that scans every backend concurrently and
//!   installs one registry snapshot per cycle
//! - The control dispatcher with its retry and deadline handling

pub mod adapter;
pub mod arp;
pub mod bluetooth;
pub mod dispatch;
pub mod hub;
pub mod orchestrator;
mod tool;

pub use adapter::BackendAdapter;
pub use arp::NetworkProbe;
pub use bluetooth::RadioProbe;
pub use dispatch::{ControlDispatcher, RetryPolicy};
pub use hub::HubAdapter;
pub use orchestrator::{BackendReport, CyclePhase, CycleReport, DiscoveryOrchestrator};
