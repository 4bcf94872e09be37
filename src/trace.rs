use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use ark_serialize::CanonicalSerialize;
use common::{CharacterKind, EventStatus, Operation, SessionTrace, TraceEvent};

/// Records what every menu operation did
#[derive(Debug)]
pub struct Journal {
    events: Vec<TraceEvent>,
    enabled: bool,
}

impl Default for Journal {
    fn default() -> Self {
        Self::new()
    }
}

impl Journal {
    pub fn new() -> Self {
        Self { events: Vec::new(), enabled: true }
    }

    /// A journal that drops every event, for sessions nobody will trace
    pub fn disabled() -> Self {
        Self { events: Vec::new(), enabled: false }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record(&mut self, operation: Operation, slot: i64, tag: Option<CharacterKind>, status: EventStatus) {
        if self.enabled {
            self.events.push(TraceEvent { operation, slot, tag, status });
        }
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// Finish the journal, attaching the heap ledger
    pub fn into_trace(self, allocations: Vec<common::AllocationData>) -> SessionTrace {
        SessionTrace { events: self.events, allocations }
    }
}

/// Write `trace` to `path` in compressed canonical form
pub fn write_trace<P: AsRef<Path>>(trace: &SessionTrace, path: P) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("Failed to create trace file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    trace
        .serialize_compressed(&mut writer)
        .map_err(|e| anyhow::anyhow!("Failed to serialize trace: {}", e))?;
    writer.flush()?;
    Ok(())
}
