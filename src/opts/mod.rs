//! Flag value types shared by commands

pub mod filters;
pub mod keyvalue;
pub mod ports;
pub mod units;

pub use filters::Filters;
pub use ports::{parse_port_spec, PortMapping};
