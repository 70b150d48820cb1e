#![allow(dead_code)]

pub mod fakes;
pub mod harness;
pub mod strategies;

pub use fakes::*;
pub use harness::*;
pub use strategies::*;
