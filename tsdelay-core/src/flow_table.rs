use std::collections::HashMap;

use log::debug;

use crate::{clock::FlowClock, flow::FlowRecord, segment::FlowKey};

/// Owning map of all tracked flow directions.
///
/// A flow's peer is the record stored under the reversed key; only
/// the `paired` flag is persisted, so pairing can never dangle. The
/// table is the sole writer of that flag: it sets both sides when a
/// reverse direction appears and clears the survivor's when a flow
/// is evicted.
#[derive(Debug)]
pub struct FlowTable {
    flows: HashMap<FlowKey, FlowRecord>,
    max_flows: usize,
}

impl FlowTable {
    pub fn new(max_flows: usize) -> Self {
        Self {
            flows: HashMap::new(),
            max_flows,
        }
    }

    /// Fetch the record for `key`, creating and pairing it on first
    /// sight. Returns `None` when the table is full — new flows are
    /// silently dropped until eviction frees space, never evicted
    /// early to make room.
    pub fn upsert(&mut self, key: FlowKey, cap_tm: f64, tsval: u32) -> Option<&mut FlowRecord> {
        if !self.flows.contains_key(&key) {
            if self.flows.len() >= self.max_flows {
                return None;
            }
            let mut record = FlowRecord::new(cap_tm, tsval);
            if let Some(reverse) = self.flows.get_mut(&key.reverse()) {
                reverse.set_paired(true);
                record.set_paired(true);
            }
            self.flows.insert(key, record);
        }
        self.flows.get_mut(&key)
    }

    pub fn get(&self, key: &FlowKey) -> Option<&FlowRecord> {
        self.flows.get(key)
    }

    pub fn get_mut(&mut self, key: &FlowKey) -> Option<&mut FlowRecord> {
        self.flows.get_mut(key)
    }

    /// The committed clock of the reverse direction, if any.
    pub fn peer_clock(&self, key: &FlowKey) -> Option<FlowClock> {
        self.flows.get(&key.reverse())?.clock()
    }

    /// Evict flows idle longer than `max_idle`, clearing the pairing
    /// of any peer left behind.
    pub fn sweep(&mut self, now: f64, max_idle: f64) {
        let idle: Vec<FlowKey> = self
            .flows
            .iter()
            .filter(|(_, record)| now - record.last_tm() > max_idle)
            .map(|(key, _)| *key)
            .collect();
        for key in idle {
            let paired = self.flows.remove(&key).map_or(false, |r| r.paired());
            debug!("evicting idle flow {key}");
            if paired {
                if let Some(peer) = self.flows.get_mut(&key.reverse()) {
                    peer.set_paired(false);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}
