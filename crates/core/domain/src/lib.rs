pub mod data;

pub use data::{DataPoint, Datagram};
