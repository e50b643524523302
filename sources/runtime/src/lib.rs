#![allow(clippy::new_without_default)]

pub mod error;
pub mod heap;
pub mod loader;
pub mod native;
pub mod stack;
pub mod vm;
