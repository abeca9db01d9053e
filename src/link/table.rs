//! In-memory sensor table with staleness eviction
//!
//! Mutated only by the reader thread; every accessor hands out snapshot
//! copies so UI polls never iterate live state.

use crate::protocol::SensorData;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

struct TrackedSensor {
    data: SensorData,
    last_seen: Instant,
}

/// Summary counters for dashboards
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSummary {
    pub total: usize,
    pub configured: usize,
    pub unconfigured: usize,
    pub alarms: usize,
}

/// Latest telemetry per sensor address, plus a bounded reading history
pub struct SensorTable {
    sensors: HashMap<String, TrackedSensor>,
    recent: VecDeque<SensorData>,
    history_cap: usize,
}

impl SensorTable {
    pub fn new(history_cap: usize) -> Self {
        Self {
            sensors: HashMap::new(),
            recent: VecDeque::with_capacity(history_cap.min(64)),
            history_cap,
        }
    }

    /// Create-or-update the entry for this reading's address
    pub fn upsert(&mut self, data: SensorData) {
        if self.recent.len() == self.history_cap {
            self.recent.pop_front();
        }
        self.recent.push_back(data.clone());

        self.sensors.insert(
            data.sensor_addr.clone(),
            TrackedSensor {
                data,
                last_seen: Instant::now(),
            },
        );
    }

    /// Remove entries not updated within `max_age`, returning how many
    pub fn evict_stale(&mut self, max_age: Duration) -> usize {
        let before = self.sensors.len();
        self.sensors.retain(|_, s| s.last_seen.elapsed() <= max_age);
        before - self.sensors.len()
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    /// Latest valid reading per address (sentinel readings excluded)
    pub fn current_temperatures(&self) -> HashMap<String, f64> {
        self.sensors
            .iter()
            .filter_map(|(addr, s)| s.data.reading().map(|t| (addr.clone(), t)))
            .collect()
    }

    /// The most recent `count` readings, oldest first
    pub fn latest(&self, count: usize) -> Vec<SensorData> {
        let skip = self.recent.len().saturating_sub(count);
        self.recent.iter().skip(skip).cloned().collect()
    }

    /// Current entries sorted for display: configured sensors first by
    /// label (01..08), then unconfigured ones by address
    pub fn snapshot_sorted(&self) -> Vec<SensorData> {
        let mut entries: Vec<&SensorData> = self.sensors.values().map(|s| &s.data).collect();
        entries.sort_by(|a, b| {
            let key = |d: &SensorData| -> (u8, String) {
                if d.is_configured() {
                    (0, d.sensor_id.clone().unwrap_or_default())
                } else {
                    (1, d.sensor_addr.clone())
                }
            };
            key(a).cmp(&key(b))
        });
        entries.into_iter().cloned().collect()
    }

    pub fn summary(&self) -> TableSummary {
        let mut summary = TableSummary {
            total: self.sensors.len(),
            ..Default::default()
        };
        for s in self.sensors.values() {
            if s.data.is_configured() {
                summary.configured += 1;
            } else {
                summary.unconfigured += 1;
            }
            if s.data.threshold_breach().is_some() {
                summary.alarms += 1;
            }
        }
        summary
    }

    #[cfg(test)]
    fn backdate(&mut self, addr: &str, age: Duration) {
        if let Some(s) = self.sensors.get_mut(addr) {
            s.last_seen = Instant::now() - age;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(addr: &str, id: Option<&str>, temp: f64) -> SensorData {
        SensorData {
            sensor_addr: addr.to_string(),
            sensor_id: id.map(str::to_string),
            temperature: temp,
            th_value: Some(30.0),
            tl_value: Some(20.0),
            measurement_interval: Some(1000),
            timestamp: None,
        }
    }

    #[test]
    fn test_upsert_replaces_by_address() {
        let mut table = SensorTable::new(100);
        table.upsert(sample("28FF000000000001", Some("01"), 21.0));
        table.upsert(sample("28FF000000000001", Some("01"), 22.5));
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.current_temperatures()["28FF000000000001"],
            22.5
        );
    }

    #[test]
    fn test_eviction_removes_exactly_the_stale_entry() {
        let mut table = SensorTable::new(100);
        table.upsert(sample("28FF00000000000A", Some("01"), 21.0));
        table.upsert(sample("28FF00000000000B", Some("02"), 22.0));
        table.backdate("28FF00000000000A", Duration::from_secs(15));

        let removed = table.evict_stale(Duration::from_secs(10));
        assert_eq!(removed, 1);
        assert_eq!(table.len(), 1);
        assert!(table.current_temperatures().contains_key("28FF00000000000B"));
    }

    #[test]
    fn test_sentinel_readings_excluded_from_temperatures() {
        let mut table = SensorTable::new(100);
        table.upsert(sample("28FF000000000001", Some("01"), 85.0));
        table.upsert(sample("28FF000000000002", Some("02"), 24.0));
        let temps = table.current_temperatures();
        assert_eq!(temps.len(), 1);
        assert!(temps.contains_key("28FF000000000002"));
    }

    #[test]
    fn test_display_order_configured_first() {
        let mut table = SensorTable::new(100);
        table.upsert(sample("28FF00000000000C", Some("00"), 20.0));
        table.upsert(sample("28FF00000000000A", Some("02"), 21.0));
        table.upsert(sample("28FF00000000000B", Some("01"), 22.0));

        let order: Vec<Option<String>> = table
            .snapshot_sorted()
            .into_iter()
            .map(|d| d.sensor_id)
            .collect();
        assert_eq!(
            order,
            vec![
                Some("01".to_string()),
                Some("02".to_string()),
                Some("00".to_string()),
            ]
        );
    }

    #[test]
    fn test_history_ring_is_bounded() {
        let mut table = SensorTable::new(3);
        for i in 0..5 {
            table.upsert(sample("28FF000000000001", Some("01"), 20.0 + i as f64));
        }
        let latest = table.latest(10);
        assert_eq!(latest.len(), 3);
        assert_eq!(latest[0].temperature, 22.0);
        assert_eq!(latest[2].temperature, 24.0);
    }

    #[test]
    fn test_summary_counts() {
        let mut table = SensorTable::new(100);
        table.upsert(sample("28FF000000000001", Some("01"), 35.0)); // above TH
        table.upsert(sample("28FF000000000002", Some("00"), 25.0));
        let summary = table.summary();
        assert_eq!(
            summary,
            TableSummary {
                total: 2,
                configured: 1,
                unconfigured: 1,
                alarms: 1,
            }
        );
    }
}
