#[macro_use]
extern crate enum_display_derive;

pub mod core;
pub mod server;
pub mod tracing;
