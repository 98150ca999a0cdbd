pub mod loader;

pub use loader::{LoadError, parse_program};
