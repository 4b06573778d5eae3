#![cfg(feature = "store")]

mod checkpoint;

pub use checkpoint::*;
