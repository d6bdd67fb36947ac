use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use sha2::{Digest, Sha256};

use crate::schedule::{parse_schedule, ScheduleError, ScheduleTable};

/// Matches the hosted portal's one-hour fetch cache window.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

struct CacheEntry {
    fingerprint: [u8; 32],
    cached_at: SystemTime,
    table: ScheduleTable,
}

/// Parsed-table cache keyed by program name and validated by a SHA-256
/// content fingerprint, so two different raw tables never collide even under
/// the same name. Purely an optimization: a miss just reparses.
pub struct ScheduleCache {
    ttl: Duration,
    entries: HashMap<String, CacheEntry>,
}

impl ScheduleCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn get_or_parse(
        &mut self,
        key: &str,
        bytes: &[u8],
        now: SystemTime,
    ) -> Result<ScheduleTable, ScheduleError> {
        let fingerprint: [u8; 32] = Sha256::digest(bytes).into();
        if let Some(entry) = self.entries.get(key) {
            let fresh = now
                .duration_since(entry.cached_at)
                .map(|age| age < self.ttl)
                .unwrap_or(false);
            if fresh && entry.fingerprint == fingerprint {
                return Ok(entry.table.clone());
            }
        }

        let table = parse_schedule(bytes)?;
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                fingerprint,
                cached_at: now,
                table: table.clone(),
            },
        );
        Ok(table)
    }

    pub fn invalidate(&mut self, key: &str) {
        self.entries.remove(key);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for ScheduleCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
