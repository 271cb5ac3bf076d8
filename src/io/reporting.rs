// src/io/reporting.rs

use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::simulation::costing::TransportCostRecord;
use crate::simulation::engine::MetricsRow;

/// Writes serializable rows to a CSV file, header taken from field names.
///
/// # Arguments
/// * `path` - Where to write (e.g., "outputs/results_summary.csv").
/// * `rows` - The records, one CSV row each.
pub fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    // Flush the buffer to ensure all data is written
    wtr.flush()?;

    info!(rows = rows.len(), path = %path.display(), "wrote CSV");
    Ok(())
}

/// Writes the metrics table of a run.
pub fn write_metrics(path: &Path, rows: &[MetricsRow]) -> Result<()> {
    write_rows(path, rows)
}

/// Writes a transport cost ledger.
pub fn write_transport_costs(path: &Path, rows: &[TransportCostRecord]) -> Result<()> {
    write_rows(path, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::engine::Phase;

    #[test]
    fn metrics_csv_has_one_row_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        let row = MetricsRow {
            period: 3,
            node_id: "R".into(),
            on_hand: 5,
            backlog_external: 1,
            backlog_children: 0,
            pipeline_in: 8,
            orders_to_parent: 4,
            received: 2,
            demand: 6,
            served: 5,
            shipped: 0,
            phase: Phase::EndOfDay,
        };
        write_metrics(&path, &[row.clone(), row]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "period,node_id,on_hand,backlog_external,backlog_children,pipeline_in,\
             orders_to_parent,received,demand,served,shipped,phase"
        );
        assert_eq!(lines[1], "3,R,5,1,0,8,4,2,6,5,0,eod");
        assert_eq!(lines.len(), 3);
    }
}
