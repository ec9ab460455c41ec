pub mod energy;

pub use energy::{EnergyStream, StreamConfig};
