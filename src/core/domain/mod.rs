pub use product::*;

pub mod product;
