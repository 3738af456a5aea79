#![doc = include_str!("../README.md")]

mod error;
mod generator;
mod id;
mod resolver;
mod time;

pub use crate::error::*;
pub use crate::generator::*;
pub use crate::id::*;
pub use crate::resolver::*;
pub use crate::time::*;
