//! The local authoritative engine: identity, clock and USM statistics.

use std::sync::atomic::{AtomicU32, Ordering};

use bytes::Bytes;
use tokio::time::Instant;

use crate::oid::Oid;
use crate::value::Value;
use crate::varbind::VarBind;

/// Seconds either side of the engine clock a message may be stamped with.
pub const TIME_WINDOW: u32 = 150;

/// Largest snmpEngineTime / snmpEngineBoots value (RFC 3414 2.2.1).
pub const MAX_ENGINE_TIME: u32 = 2_147_483_647;

/// net-snmp's enterprise number, used for generated engine ids.
const ENTERPRISE: u32 = 8072;

/// Generate an RFC 3411 engine id: enterprise, format 5 (octets), 8 random bytes.
pub fn generate_engine_id() -> Bytes {
    let mut id = Vec::with_capacity(13);
    id.extend_from_slice(&(0x8000_0000 | ENTERPRISE).to_be_bytes());
    id.push(0x05);
    let mut random = [0u8; 8];
    if getrandom::fill(&mut random).is_err() {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        random = nanos.to_be_bytes();
    }
    id.extend_from_slice(&random);
    Bytes::from(id)
}

/// Reports the authoritative engine sends when inbound USM processing fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsmReport {
    UnsupportedSecLevel,
    NotInTimeWindow,
    UnknownUserName,
    UnknownEngineId,
    WrongDigest,
    DecryptionError,
}

impl UsmReport {
    /// `usmStats*` counter instance (1.3.6.1.6.3.15.1.1.N.0).
    pub fn oid(self) -> Oid {
        let n = match self {
            Self::UnsupportedSecLevel => 1,
            Self::NotInTimeWindow => 2,
            Self::UnknownUserName => 3,
            Self::UnknownEngineId => 4,
            Self::WrongDigest => 5,
            Self::DecryptionError => 6,
        };
        crate::oid!(1, 3, 6, 1, 6, 3, 15, 1, 1, n, 0)
    }
}

/// usmStats counters.
#[derive(Debug, Default)]
pub struct UsmStats {
    counters: [AtomicU32; 6],
}

impl UsmStats {
    fn slot(report: UsmReport) -> usize {
        report.oid().arcs()[9] as usize - 1
    }

    /// Bump a counter and return the binding to carry in the Report PDU.
    pub fn record(&self, report: UsmReport) -> VarBind {
        let value = self.counters[Self::slot(report)].fetch_add(1, Ordering::Relaxed) + 1;
        VarBind::new(report.oid(), Value::Counter32(value))
    }

    pub fn get(&self, report: UsmReport) -> u32 {
        self.counters[Self::slot(report)].load(Ordering::Relaxed)
    }
}

/// Identity and clock of the local SNMP engine.
#[derive(Debug)]
pub struct LocalEngine {
    engine_id: Bytes,
    boots: u32,
    started: Instant,
    stats: UsmStats,
}

impl LocalEngine {
    pub fn new(engine_id: Bytes, boots: u32) -> Self {
        Self {
            engine_id,
            boots: boots.min(MAX_ENGINE_TIME),
            started: Instant::now(),
            stats: UsmStats::default(),
        }
    }

    pub fn engine_id(&self) -> &Bytes {
        &self.engine_id
    }

    pub fn boots(&self) -> u32 {
        self.boots
    }

    /// Seconds since this engine instance started.
    pub fn time(&self) -> u32 {
        let secs = self.started.elapsed().as_secs();
        u32::try_from(secs).unwrap_or(MAX_ENGINE_TIME).min(MAX_ENGINE_TIME)
    }

    /// Hundredths of a second since start, for sysUpTime.
    pub fn uptime_ticks(&self) -> u32 {
        (self.started.elapsed().as_millis() / 10) as u32
    }

    pub fn stats(&self) -> &UsmStats {
        &self.stats
    }

    /// Timeliness check for an authenticated message (RFC 3414 3.2 step 7b).
    pub fn in_time_window(&self, msg_boots: u32, msg_time: u32) -> bool {
        if self.boots == MAX_ENGINE_TIME || msg_boots != self.boots {
            return false;
        }
        self.time().abs_diff(msg_time) <= TIME_WINDOW
    }
}
