use crate::output::{local_time, print_json};
use anyhow::Context;
use chrono::Utc;
use presence_core::config::Config;
use presence_core::derive::StateDeriver;
use presence_core::ledger::Ledger;
use presence_core::types::ClockEvent;
use presence_core::window::{parse_date, DayWindow};
use presence_core::{io, paths};
use std::path::Path;

/// The day to report on: `date` if given, otherwise today in the org offset.
pub fn day_window(config: &Config, date: Option<&str>) -> anyhow::Result<DayWindow> {
    let offset = config.offset()?;
    Ok(match date {
        Some(d) => DayWindow::new(parse_date(d)?, offset),
        None => DayWindow::containing(Utc::now(), offset),
    })
}

/// One actor's events inside `window`, in ledger order.
pub fn ledger_day(ledger: &Ledger, actor_id: &str, window: &DayWindow) -> anyhow::Result<Vec<ClockEvent>> {
    ledger
        .list_day_blocking(actor_id, window)
        .with_context(|| format!("failed to read events for '{actor_id}'"))
}

pub fn run(
    root: &Path,
    actor_id: &str,
    date: Option<&str>,
    events_file: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let window = day_window(&config, date)?;
    let deriver = StateDeriver::from_config(&config)?;

    let events = match events_file {
        Some(path) => {
            let all: Vec<ClockEvent> = io::read_json(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            all.into_iter().filter(|e| e.actor_id == actor_id).collect()
        }
        None => {
            let ledger = Ledger::open(&paths::ledger_path(root)).context("failed to open ledger")?;
            ledger_day(&ledger, actor_id, &window)?
        }
    };

    let now = Utc::now().min(window.end());
    let state = deriver.derive(actor_id, &events, &window, now);

    if json {
        return print_json(&state);
    }

    let offset = window.offset();
    println!("{} on {}", state.actor_id, state.date);
    println!("  status:     {}", state.current_status);
    println!("  first in:   {}", local_time(state.first_in, offset));
    println!("  last out:   {}", local_time(state.last_out, offset));
    println!("  worked:     {}h {:02}m", state.work_minutes / 60, state.work_minutes % 60);
    println!("  late by:    {} min", state.late_by_minutes);
    println!("  captures:   {}", state.captures.len());
    Ok(())
}
