pub mod connection;
pub mod coordinator;

pub use coordinator::{RoomCoordinator, RoomError};
