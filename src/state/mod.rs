//! Form state module

pub mod forms;

pub use forms::*;
