pub mod cafeteria_system;

pub use cafeteria_system::{CafeteriaSystem, SystemError};
