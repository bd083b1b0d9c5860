// src/console/render.rs

use std::sync::Arc;

use comfy_table::{Attribute, Cell, Table, presets::UTF8_FULL_CONDENSED};

use crate::core::models::{Service, Target};
use crate::core::table::JobRow;

pub fn target_table(targets: &[Arc<Target>]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec!["ID", "Name", "Address", "OS", "State"]);
    for target in targets {
        table.add_row(vec![
            Cell::new(target.id),
            Cell::new(&target.name),
            Cell::new(&target.addr),
            Cell::new(&target.os),
            Cell::new(if target.running { "up" } else { "off" }),
        ]);
    }
    table
}

pub fn service_table(services: &[Service]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec!["Port", "Protocol", "Name"]);
    for service in services {
        table.add_row(vec![
            Cell::new(service.port),
            Cell::new(service.protocol),
            Cell::new(&service.name),
        ]);
    }
    table
}

pub fn job_table(rows: &[JobRow]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec!["", "Target", "Service", "Scanner", "Status"]);
    for row in rows {
        let mut cells = vec![
            Cell::new(row.index),
            Cell::new(&row.target),
            Cell::new(&row.service),
            Cell::new(row.scanner),
            Cell::new(&row.status),
        ];
        if !row.active {
            cells = cells
                .into_iter()
                .map(|cell| cell.add_attribute(Attribute::Dim))
                .collect();
        }
        table.add_row(cells);
    }
    table
}

/// `H:MM:SS` elapsed-time rendering for completion messages.
pub fn format_elapsed(elapsed: chrono::Duration) -> String {
    let secs = elapsed.num_seconds().max(0);
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_formats_as_clock_time() {
        assert_eq!(format_elapsed(chrono::Duration::seconds(3671)), "1:01:11");
        assert_eq!(format_elapsed(chrono::Duration::seconds(-5)), "0:00:00");
    }
}
