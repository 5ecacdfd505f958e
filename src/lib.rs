//! initfs library
//!
//! Shared modules used by the image tools (mkfs, info): the flash block
//! device emulation over an in-memory image, the `littlefs2` storage driver
//! on top of it, and the builder/inspector logic.

pub mod config;
pub mod device;
pub mod error;
pub mod info;
pub mod mkfs;
pub mod region;
pub mod session;
