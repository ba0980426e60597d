use crate::output::print_json;
use anyhow::Context;
use presence_core::config::Config;
use presence_core::geofence::{self, format_distance};
use presence_core::types::Position;
use presence_core::PresenceError;
use std::path::Path;

pub enum Target {
    Site(String),
    Point(f64, f64),
}

pub fn run(root: &Path, lat: f64, lon: f64, target: Target, json: bool) -> anyhow::Result<()> {
    match target {
        Target::Point(to_lat, to_lon) => {
            let meters = geofence::distance_meters(lat, lon, to_lat, to_lon)?;
            if json {
                print_json(&serde_json::json!({ "distance_meters": meters }))?;
            } else {
                println!("{}", format_distance(meters));
            }
        }
        Target::Site(site_id) => {
            let config = Config::load(root).context("failed to load config")?;
            let site = config
                .sites
                .iter()
                .find(|s| s.id == site_id)
                .ok_or_else(|| PresenceError::SiteNotFound(site_id.clone()))?;
            let outcome = geofence::evaluate(&Position::new(lat, lon), site)?;
            if json {
                print_json(&serde_json::json!({
                    "site_id": site.id,
                    "distance_meters": outcome.distance_meters,
                    "radius_meters": outcome.radius_meters,
                    "within_radius": outcome.within_radius,
                }))?;
            } else {
                let verdict = if outcome.within_radius { "inside" } else { "outside" };
                println!(
                    "{} from {} ({verdict} the {} radius)",
                    format_distance(outcome.distance_meters),
                    site.name,
                    format_distance(outcome.radius_meters)
                );
            }
        }
    }
    Ok(())
}
