mod bus_types;
mod dispatch;
mod error;
mod freq;
mod jac;
mod network;
mod newton;
mod pf;
mod results;
mod sbus;
mod scenario;
mod shedding;
mod ybus;

pub mod debug;

pub use bus_types::*;
pub use dispatch::*;
pub use error::*;
pub use freq::*;
pub use jac::*;
pub use network::*;
pub use newton::*;
pub use pf::*;
pub use results::*;
pub use sbus::*;
pub use scenario::*;
pub use shedding::*;
pub use ybus::*;
