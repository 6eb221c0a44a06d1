//! Built-in type collectors.

pub mod process;
pub mod web;

pub use process::{ProcessCollector, ProcessSnapshot};
pub use web::WebCollector;
