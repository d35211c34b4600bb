//! Host abstraction layer for namada-setup.
//!
//! Everything that touches the host (users, files, kernel parameters, services, firewall,
//! packages, processes, network downloads) goes through the traits in [`hal`], so workflows
//! can be exercised against [`FakeHal`] without root or a real Ubuntu machine.

pub mod error;
pub mod hal;
pub mod os_release;

pub use error::{HalError, HalResult};
pub use hal::*;
