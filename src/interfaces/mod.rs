//! Operator interfaces

pub mod cli;
