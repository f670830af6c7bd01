//! Batch replay of recorded uplinks
//!
//! Reads a JSON-lines file of uplink events, decodes them and returns one
//! result per event in input order. Events of one device are decoded in
//! arrival order through a shared [`StateStore`]; different devices run in
//! parallel on a rayon pool.

use anyhow::{Context, Result};
use lora_codec::{DecoderRegistry, Sample, StateStore, UplinkEvent};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::io::BufRead;

/// Outcome of one replayed event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRecord {
    /// 1-based line number in the input
    pub line: usize,
    pub device_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub samples: Vec<Sample>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary counters for a batch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub events: usize,
    pub devices: usize,
    pub failed: usize,
    pub samples: usize,
}

/// Parse JSON lines into events, skipping blank lines
pub fn read_events(reader: impl BufRead) -> Result<Vec<(usize, UplinkEvent)>> {
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line.with_context(|| format!("Failed to read line {}", line_no))?;
        if line.trim().is_empty() {
            continue;
        }
        let event: UplinkEvent = serde_json::from_str(&line)
            .with_context(|| format!("Invalid uplink event on line {}", line_no))?;
        events.push((line_no, event));
    }
    Ok(events)
}

/// Decode all events, sequential per device and parallel across devices
pub fn run_batch(
    registry: &DecoderRegistry,
    store: &StateStore,
    events: Vec<(usize, UplinkEvent)>,
) -> (Vec<BatchRecord>, BatchStats) {
    let total = events.len();

    // Group by device, keeping arrival order inside each group
    let mut group_index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Vec<(usize, usize, UplinkEvent)>> = Vec::new();
    for (position, (line, event)) in events.into_iter().enumerate() {
        let slot = *group_index.entry(event.device_id.clone()).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push((position, line, event));
    }
    log::info!("Replaying {} events from {} devices", total, groups.len());

    let mut results: Vec<(usize, BatchRecord)> = groups
        .par_iter()
        .flat_map_iter(|group| {
            group.iter().map(|(position, line, event)| {
                let record = match registry.process(event, store) {
                    Ok(output) => BatchRecord {
                        line: *line,
                        device_id: event.device_id.clone(),
                        samples: output.samples,
                        error: None,
                    },
                    Err(e) => {
                        log::warn!("Line {} ({}): {}", line, event.device_id, e);
                        BatchRecord {
                            line: *line,
                            device_id: event.device_id.clone(),
                            samples: Vec::new(),
                            error: Some(e.to_string()),
                        }
                    }
                };
                (*position, record)
            })
        })
        .collect();
    results.sort_unstable_by_key(|(position, _)| *position);

    let records: Vec<BatchRecord> = results.into_iter().map(|(_, record)| record).collect();
    let stats = BatchStats {
        events: total,
        devices: groups.len(),
        failed: records.iter().filter(|r| r.error.is_some()).count(),
        samples: records.iter().map(|r| r.samples.len()).sum(),
    };

    (records, stats)
}
