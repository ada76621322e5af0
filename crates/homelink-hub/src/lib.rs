//! Homelink Hub - Home-automation hub integration
//!
//! This crate wraps the hub's REST API (entity state listing and service
//! calls) and maps hub entities onto the normalized device model.

pub mod client;
pub mod entities;

pub use client::{HubClient, HubError, HubResult};
pub use entities::{entity_to_device, kind_for_domain, service_for, EntityState, ServiceCall};
