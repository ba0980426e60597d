pub mod config;
pub mod derive;
pub mod distance;
pub mod init;
pub mod serve;
pub mod summarize;
