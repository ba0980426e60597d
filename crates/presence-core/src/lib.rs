pub mod aggregate;
pub mod biometric;
pub mod config;
pub mod coordinator;
pub mod derive;
pub mod directory;
pub mod error;
pub mod geofence;
pub mod io;
pub mod ledger;
pub mod paths;
pub mod store;
pub mod types;
pub mod window;

pub use error::{PresenceError, Result};
