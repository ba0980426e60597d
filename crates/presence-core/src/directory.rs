use crate::config::Config;
use crate::types::{Actor, Site};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("site directory unavailable: {0}")]
pub struct DirectoryError(pub String);

/// Read-only view of the externally managed site list.
#[async_trait]
pub trait SiteDirectory: Send + Sync {
    async fn list_active_sites(&self) -> Result<Vec<Site>, DirectoryError>;
}

/// Actors who are expected to clock, with their enrolled reference images.
pub trait Roster: Send + Sync {
    fn actors(&self) -> Vec<Actor>;

    fn find(&self, actor_id: &str) -> Option<Actor> {
        self.actors().into_iter().find(|a| a.id == actor_id)
    }
}

// ---------------------------------------------------------------------------
// StaticDirectory
// ---------------------------------------------------------------------------

/// Sites and roster loaded once from the config file.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    sites: Vec<Site>,
    actors: Vec<Actor>,
}

impl StaticDirectory {
    pub fn new(sites: Vec<Site>, actors: Vec<Actor>) -> Self {
        Self { sites, actors }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.sites.clone(), config.roster.clone())
    }
}

#[async_trait]
impl SiteDirectory for StaticDirectory {
    async fn list_active_sites(&self) -> Result<Vec<Site>, DirectoryError> {
        Ok(self.sites.iter().filter(|s| s.active).cloned().collect())
    }
}

impl Roster for StaticDirectory {
    fn actors(&self) -> Vec<Actor> {
        self.actors.clone()
    }
}
