pub mod actors;
pub mod clock;
pub mod config;
pub mod events;
pub mod sites;
pub mod summary;
