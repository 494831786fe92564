pub mod error;
pub mod graph;
pub mod io;
pub mod overlay;
pub mod params;
pub mod runner;
pub mod scaffold;
pub mod settings;
pub mod steps;
pub mod tools;

pub use error::{FlowdeckError, Result};
