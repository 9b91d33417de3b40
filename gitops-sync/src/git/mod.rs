//! Git module

pub mod tags;
pub mod transport;
pub mod tree;
