use crate::cmd::derive::{day_window, ledger_day};
use crate::output::{local_time, print_json, print_table};
use anyhow::Context;
use chrono::Utc;
use presence_core::aggregate::Aggregator;
use presence_core::config::Config;
use presence_core::derive::StateDeriver;
use presence_core::ledger::Ledger;
use presence_core::paths;
use std::path::Path;

pub fn run(root: &Path, date: Option<&str>, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let window = day_window(&config, date)?;
    let deriver = StateDeriver::from_config(&config)?;
    let ledger = Ledger::open(&paths::ledger_path(root)).context("failed to open ledger")?;
    let now = Utc::now().min(window.end());

    let mut states = Vec::with_capacity(config.roster.len());
    for actor in &config.roster {
        let events = ledger_day(&ledger, &actor.id, &window)?;
        states.push(deriver.derive(&actor.id, &events, &window, now));
    }
    let sites: Vec<_> = config.sites.iter().filter(|s| s.active).cloned().collect();
    let summary = Aggregator::from_config(&config).summarize(&states, &sites, &config.roster);

    if json {
        return print_json(&summary);
    }

    println!(
        "{}: {}/{} present ({}%), {} clocked in now",
        window.date(),
        summary.present_today,
        summary.total_actors,
        summary.attendance_rate,
        summary.clocked_in_now
    );

    if !summary.staff_by_site.is_empty() {
        println!();
        let rows = summary
            .staff_by_site
            .iter()
            .map(|s| vec![s.site_id.clone(), s.name.clone(), s.count.to_string()])
            .collect();
        print_table(&["SITE", "NAME", "STAFF"], rows);
    }

    if !summary.late_arrivals.is_empty() {
        println!("\nLate arrivals:");
        let offset = window.offset();
        let rows = summary
            .late_arrivals
            .iter()
            .map(|l| {
                vec![
                    l.actor_id.clone(),
                    l.name.clone(),
                    local_time(Some(l.first_in), offset),
                    format!("{} min", l.late_by_minutes),
                ]
            })
            .collect();
        print_table(&["ACTOR", "NAME", "FIRST IN", "LATE"], rows);
    }
    Ok(())
}
