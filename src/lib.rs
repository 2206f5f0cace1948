//! wifi-connect Library
//!
//! Wi-Fi provisioning for a headless voice device: bring up a temporary
//! access point, guide the user through the captive portal, and report
//! each stage of setup on the message bus.

pub mod audit;
pub mod config;
pub mod error;
pub mod events;
pub mod facts;
pub mod presentation;
pub mod provision;
