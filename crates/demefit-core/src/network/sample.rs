use crate::TipId;
use demefit_error::{DemefitResult, ensure};

/// Ordered association between sample labels and tip bits.
///
/// Sample `i` owns bit `1 << i`; the order is the order of registration.
/// Each sample also records the segment it is injected into at the start of
/// a replicate.
#[derive(Clone, Debug, Default)]
pub struct SampleIndex {
    entries: Vec<Sample>,
}

#[derive(Clone, Debug)]
struct Sample {
    label: String,
    segment: usize,
}

impl SampleIndex {
    pub fn new() -> Self {
        SampleIndex::default()
    }

    /// Register one sampled lineage in `segment`, returning its bit index.
    pub fn add(&mut self, segment: usize, label: &str) -> DemefitResult<u32> {
        ensure!(
            self.entries.len() < u32::BITS as usize,
            InvalidConfig: "at most {} samples are supported", u32::BITS
        );
        self.entries.push(Sample {
            label: label.to_string(),
            segment,
        });
        Ok(self.entries.len() as u32 - 1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bitwise union of every sample bit.
    pub fn universe(&self) -> TipId {
        if self.entries.is_empty() {
            return TipId::EMPTY;
        }
        TipId(((1u64 << self.entries.len()) - 1) as u32)
    }

    pub fn label(&self, i: usize) -> &str {
        &self.entries[i].label
    }

    pub fn segment_of(&self, i: usize) -> usize {
        self.entries[i].segment
    }

    /// Iterate `(bit index, segment)` pairs in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, usize)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, s)| (i as u32, s.segment))
    }

    /// Human-readable label for a site pattern, e.g. `a:c` for the pattern
    /// containing samples `a` and `c`.
    pub fn pattern_label(&self, tid: TipId) -> String {
        let mut parts = Vec::new();
        for (i, sample) in self.entries.iter().enumerate() {
            if tid.0 & (1 << i) != 0 {
                parts.push(sample.label.as_str());
            }
        }
        parts.join(":")
    }
}
