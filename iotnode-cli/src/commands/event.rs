//! Event CLI commands: schedule, list and remove events.

use std::path::Path;
use std::time::Duration;

use clap::Subcommand;
use iotnode::node::{TEXT_EVENTS, WEB_EVENTS};
use iotnode::store::{Event, EventKind, EventStore};
use iotnode::time::{Clock, SystemClock};

use super::common::{load_config, parse_start, show_time};
use crate::error::CliError;

/// Event subcommands.
#[derive(Debug, Subcommand)]
pub enum EventAction {
    /// Schedule an event (replaces an event with the same id)
    Add {
        /// Event id
        eid: i64,

        /// Content key or URL, or the marquee text with --text
        resource: String,

        /// Start time: 'YYYY-MM-DD HH:MM:SS', 'now' or '+SECONDS'
        start: String,

        /// Playback duration in seconds
        #[arg(long)]
        duration: Option<u64>,

        /// Schedule a marquee text event
        #[arg(long)]
        text: bool,
    },

    /// List scheduled events in start order
    List {
        /// List marquee text events
        #[arg(long)]
        text: bool,
    },

    /// Remove a scheduled event
    Remove {
        eid: i64,

        /// Remove from the marquee text events
        #[arg(long)]
        text: bool,
    },
}

/// Run an event subcommand.
///
/// Changes are picked up by a running node at its next wake.
pub fn run(config_path: &Path, action: EventAction) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let open = |text: bool| {
        EventStore::open(
            &config.node.db_dir,
            if text { TEXT_EVENTS } else { WEB_EVENTS },
        )
    };

    match action {
        EventAction::Add {
            eid,
            resource,
            start,
            duration,
            text,
        } => {
            let start = parse_start(&start, SystemClock.now())?;
            let duration = duration.map(Duration::from_secs);
            let event = if text {
                Event::text(eid, resource, start, duration)
            } else {
                Event::web_resource(eid, &resource, start, duration)
            };
            open(text)?.insert(&event)?;
            println!("Scheduled event {} at {}", event.eid, show_time(event.start_time));
            Ok(())
        }
        EventAction::List { text } => {
            let events = open(text)?.list()?;
            if events.is_empty() {
                println!("No events scheduled");
            }
            for event in events {
                println!("{}", describe(&event));
            }
            Ok(())
        }
        EventAction::Remove { eid, text } => {
            if open(text)?.remove(eid)? {
                println!("Removed event {}", eid);
                Ok(())
            } else {
                Err(CliError::NotFound(format!("event {}", eid)))
            }
        }
    }
}

fn describe(event: &Event) -> String {
    let duration = event
        .duration
        .map(|d| format!("{}s", d.as_secs()))
        .unwrap_or_else(|| "-".to_string());
    let label = match event.kind {
        EventKind::WebResource => "media",
        EventKind::Text => "text",
    };
    format!(
        "{:>6}  {}  {:>6}  {:<5}  {}",
        event.eid,
        show_time(event.start_time),
        duration,
        label,
        event.resource
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_describe_event() {
        let start = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let event = Event::web_resource(3, "http://media.example/a.mp4", start, Some(Duration::from_secs(15)));

        assert_eq!(
            describe(&event),
            "     3  2024-06-01 09:00:00.000     15s  media  a.mp4"
        );
    }
}
