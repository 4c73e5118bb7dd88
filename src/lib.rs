#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(test)]
extern crate std;

pub mod log;

pub mod config;
pub mod error;

pub mod clock;
pub mod wire;

pub mod actuator;
pub mod commit;
pub mod pattern;
pub mod role;
pub mod router;
pub mod sync;
pub mod transport;

pub mod queue;

#[cfg(feature = "std")]
pub mod node;
