#![doc = include_str!("../README.md")]

mod error;

pub mod bits;
pub mod decode;
pub mod event;
pub mod record;
pub mod spacepacket;
pub mod xtce;

pub use error::{Error, Result};
