// Library exports for the exfoliator relay simulator

pub mod relay;
pub mod server;

pub use relay::{Reaction, RelayState};
pub use server::{serve, spawn, SimConfig, SimHandle};
