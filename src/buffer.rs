//! Circular observation buffer and checkpoint (spec §4.5, §5).
//!
//! A single [`std::sync::RwLock`] guards the ring plus both checkpoint
//! structures; writers (ingestion workers) take the write side briefly per
//! `append`, readers (HTTP handlers, streaming sessions) take the read side
//! for the duration of one `range`/`checkpoint_at` call and clone out what
//! they need before releasing it, matching spec §5's discipline. A
//! `tokio::sync::Notify` wakes streaming sessions on every append.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::observation::{merge_data_set, Observation, Value};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    #[error("sequence {requested} is out of range (buffer starts at {first_sequence})")]
    OutOfRange { requested: u64, first_sequence: u64 },
}

/// Latest-observation-per-data-item snapshot (spec §3 "Checkpoint").
#[derive(Debug, Clone, Default)]
pub struct Checkpoint {
    entries: HashMap<String, Observation>,
}

impl Checkpoint {
    pub fn get(&self, data_item_id: &str) -> Option<&Observation> {
        self.entries.get(data_item_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Observation)> {
        self.entries.iter()
    }

    /// A copy containing only the entries whose data-item id is in `ids`
    /// (spec §4.7 `path` filtering on `/current`).
    pub fn filtered(&self, ids: &std::collections::HashSet<&str>) -> Checkpoint {
        Checkpoint {
            entries: self
                .entries
                .iter()
                .filter(|(id, _)| ids.contains(id.as_str()))
                .map(|(id, obs)| (id.clone(), obs.clone()))
                .collect(),
        }
    }

    fn apply(&mut self, observation: Observation) {
        self.entries.insert(observation.data_item_id.clone(), observation);
    }
}

struct Inner {
    capacity: usize,
    checkpoint_frequency: usize,
    observations: VecDeque<Observation>,
    first_sequence: u64,
    next_sequence: u64,
    latest: Checkpoint,
    /// Anchored checkpoints keyed by the sequence at which they were taken,
    /// taken every `checkpoint_frequency` appends (spec §4.5).
    anchors: BTreeMap<u64, Checkpoint>,
}

impl Inner {
    fn get_at(&self, sequence: u64) -> Option<&Observation> {
        if sequence < self.first_sequence || sequence >= self.next_sequence {
            return None;
        }
        let idx = (sequence - self.first_sequence) as usize;
        self.observations.get(idx)
    }
}

/// The shared, cloneable handle to the buffer. Cheap to clone (an `Arc`
/// internally), mirroring how the teacher passes shared state as `&'static`
/// handles rather than behind a fresh lock per call site.
#[derive(Clone)]
pub struct Buffer {
    inner: Arc<RwLock<Inner>>,
    notify: Arc<tokio::sync::Notify>,
}

impl Buffer {
    pub fn new(capacity: usize, checkpoint_frequency: usize) -> Self {
        let checkpoint_frequency = checkpoint_frequency.max(1);
        Self {
            inner: Arc::new(RwLock::new(Inner {
                capacity: capacity.max(1),
                checkpoint_frequency,
                observations: VecDeque::with_capacity(capacity),
                first_sequence: 1,
                next_sequence: 1,
                latest: Checkpoint::default(),
                anchors: BTreeMap::new(),
            })),
            notify: Arc::new(tokio::sync::Notify::new()),
        }
    }

    /// Fold a raw DATA_SET observation against whatever is currently
    /// checkpointed for `data_item_id`, returning the map to store as the
    /// observation's [`Value::DataSet`] (spec §4.5, §8 S1-S3). Pure read;
    /// does not mutate the buffer.
    pub fn fold_data_set(
        &self,
        data_item_id: &str,
        reset: bool,
        entries: &[(String, String)],
    ) -> BTreeMap<String, String> {
        let inner = self.inner.read().unwrap();
        let existing = match inner.latest.get(data_item_id) {
            Some(Observation { value: Value::DataSet(map), .. }) => map.clone(),
            _ => BTreeMap::new(),
        };
        merge_data_set(&existing, reset, entries)
    }

    /// Append an observation, assigning it the next sequence number.
    pub fn append(&self, mut observation: Observation) -> u64 {
        let mut inner = self.inner.write().unwrap();
        let sequence = inner.next_sequence;
        observation.sequence = sequence;
        inner.next_sequence += 1;
        inner.observations.push_back(observation.clone());
        if inner.observations.len() > inner.capacity {
            inner.observations.pop_front();
            inner.first_sequence += 1;
        }
        inner.latest.apply(observation);
        if sequence % inner.checkpoint_frequency as u64 == 0 {
            let snapshot = inner.latest.clone();
            inner.anchors.insert(sequence, snapshot);
        }
        drop(inner);
        self.notify.notify_waiters();
        sequence
    }

    pub fn get(&self, sequence: u64) -> Option<Observation> {
        let inner = self.inner.read().unwrap();
        inner.get_at(sequence).cloned()
    }

    /// Up to `count` consecutive observations starting at `max(from, first_sequence)`.
    pub fn range(&self, from: u64, count: usize) -> (Vec<Observation>, u64) {
        let inner = self.inner.read().unwrap();
        let start = from.max(inner.first_sequence);
        let mut out = Vec::with_capacity(count.min(inner.observations.len()));
        let mut seq = start;
        while out.len() < count && seq < inner.next_sequence {
            if let Some(obs) = inner.get_at(seq) {
                out.push(obs.clone());
            }
            seq += 1;
        }
        (out, seq)
    }

    pub fn checkpoint_at(&self, sequence: u64) -> Result<Checkpoint, BufferError> {
        let inner = self.inner.read().unwrap();
        if sequence < inner.first_sequence || sequence >= inner.next_sequence {
            return Err(BufferError::OutOfRange {
                requested: sequence,
                first_sequence: inner.first_sequence,
            });
        }
        let (anchor_seq, mut checkpoint) = inner
            .anchors
            .range(..=sequence)
            .next_back()
            .map(|(seq, cp)| (*seq, cp.clone()))
            .unwrap_or((0, Checkpoint::default()));
        for seq in (anchor_seq + 1)..=sequence {
            if let Some(obs) = inner.get_at(seq) {
                checkpoint.apply(obs.clone());
            }
        }
        Ok(checkpoint)
    }

    pub fn latest(&self) -> Checkpoint {
        self.inner.read().unwrap().latest.clone()
    }

    pub fn first_sequence(&self) -> u64 {
        self.inner.read().unwrap().first_sequence
    }

    pub fn next_sequence(&self) -> u64 {
        self.inner.read().unwrap().next_sequence
    }

    /// Wait until the next append, or return immediately if one happened
    /// since this call was issued (used by [`crate::server::streaming`]).
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}
