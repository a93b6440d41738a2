//! The population network: a DAG of [Segment]s.
//!
//! Each segment is one population during one epoch. Segments are owned by a
//! flat array and refer to each other by index, so a deep copy of the
//! network for a worker thread is a plain clone and every index stays valid.
//! A segment with two parents is an admixture: a lineage leaving it ascends
//! to `parents[1]` with probability `mix`, else to `parents[0]`.

mod sample;

pub use sample::SampleIndex;

use crate::TipId;
use crate::params::{Bounds, ParamId, ParamKind, ParamStore};
use demefit_error::{DemefitError, DemefitResult, demefit_bail, demefit_err};
use std::collections::HashMap;

#[derive(Clone, Debug)]
pub struct Segment {
    name: String,
    pub(crate) two_n: ParamId,
    pub(crate) start: ParamId,
    /// None marks the root epoch, which extends to infinity.
    pub(crate) end: Option<ParamId>,
    pub(crate) parents: Vec<usize>,
    pub(crate) children: Vec<usize>,
    pub(crate) mix: Option<ParamId>,
    /// Active lineages, transient state of one coalescent replicate.
    pub(crate) lineages: Vec<TipId>,
}

impl Segment {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn two_n(&self) -> ParamId {
        self.two_n
    }

    pub fn start(&self) -> ParamId {
        self.start
    }

    pub fn end(&self) -> Option<ParamId> {
        self.end
    }

    pub fn parents(&self) -> &[usize] {
        &self.parents
    }

    pub fn children(&self) -> &[usize] {
        &self.children
    }

    pub fn mix(&self) -> Option<ParamId> {
        self.mix
    }
}

#[derive(Clone, Debug)]
pub struct PopNetwork {
    segments: Vec<Segment>,
    /// Segment indices ordered leaves first, root last.
    topo: Vec<usize>,
    root: usize,
}

impl PopNetwork {
    pub fn builder() -> NetworkBuilder {
        NetworkBuilder::new()
    }

    /// Index of the unique segment without parents.
    pub fn root(&self) -> usize {
        self.root
    }

    pub fn n_segments(&self) -> usize {
        self.segments.len()
    }

    pub fn segment(&self, i: usize) -> &Segment {
        &self.segments[i]
    }

    pub(crate) fn segment_mut(&mut self, i: usize) -> &mut Segment {
        &mut self.segments[i]
    }

    /// Visit order for the simulator: every segment appears after all of its
    /// children.
    pub fn topo_order(&self) -> &[usize] {
        &self.topo
    }

    /// Check whether the current parameter values describe a network the
    /// simulator can run: every size and time inside the global box and its
    /// own bounds, every mix fraction in [0, 1], and no child starting after
    /// its parent.
    pub fn feasible(&self, store: &ParamStore, bounds: &Bounds) -> bool {
        for seg in &self.segments {
            let two_n = store.value(seg.two_n);
            if two_n < bounds.lo_two_n || two_n > bounds.hi_two_n || !store.in_bounds(seg.two_n) {
                return false;
            }

            let start = store.value(seg.start);
            if start < bounds.lo_time || start > bounds.hi_time || !store.in_bounds(seg.start) {
                return false;
            }

            if let Some(mix) = seg.mix {
                let m = store.value(mix);
                if !(0.0..=1.0).contains(&m) || !store.in_bounds(mix) {
                    return false;
                }
            }

            for &p in &seg.parents {
                if start > store.value(self.segments[p].start) {
                    return false;
                }
            }
        }
        true
    }

    /// Push each sampled lineage's single-bit id into its segment.
    pub fn inject_samples(&mut self, samples: &SampleIndex) {
        for (bit, segment) in samples.iter() {
            self.segments[segment].lineages.push(TipId::bit(bit));
        }
    }

    /// Empty every segment's lineage list ahead of the next replicate.
    pub fn clear_samples(&mut self) {
        for seg in &mut self.segments {
            seg.lineages.clear();
        }
    }

    pub fn is_clear(&self) -> bool {
        self.segments.iter().all(|s| s.lineages.is_empty())
    }
}

struct SegDecl {
    name: String,
    two_n: ParamId,
    start: ParamId,
    end: Option<ParamId>,
    parents: Vec<usize>,
    children: Vec<usize>,
    mix: Option<ParamId>,
    samples: usize,
}

/// Builds a [PopNetwork] and its [SampleIndex] from declarative calls.
///
/// Structural errors accumulate and surface from [NetworkBuilder::build],
/// so the fluent chain never panics halfway through a description.
#[derive(Default)]
pub struct NetworkBuilder {
    segments: Vec<SegDecl>,
    by_name: HashMap<String, usize>,
    errors: Vec<DemefitError>,
}

impl NetworkBuilder {
    pub fn new() -> Self {
        NetworkBuilder::default()
    }

    /// Declare a population segment beginning at `start` with size `two_n`.
    pub fn segment(mut self, name: &str, two_n: ParamId, start: ParamId) -> Self {
        if self.by_name.contains_key(name) {
            self.errors
                .push(demefit_err!(NetworkShape: "duplicate segment \"{}\"", name));
            return self;
        }
        self.by_name.insert(name.to_string(), self.segments.len());
        self.segments.push(SegDecl {
            name: name.to_string(),
            two_n,
            start,
            end: None,
            parents: Vec::new(),
            children: Vec::new(),
            mix: None,
            samples: 0,
        });
        self
    }

    /// Inject `n` sampled lineages into `name` at the start of every
    /// replicate.
    pub fn samples(mut self, name: &str, n: usize) -> Self {
        match self.by_name.get(name).copied() {
            Some(i) => self.segments[i].samples += n,
            None => self
                .errors
                .push(demefit_err!(NetworkShape: "samples for unknown segment \"{}\"", name)),
        }
        self
    }

    /// Make `parent` the single ancestor of `child`. The child's epoch ends
    /// where the parent's begins.
    pub fn derive(mut self, child: &str, parent: &str) -> Self {
        let (c, p) = match (self.by_name.get(child).copied(), self.by_name.get(parent).copied()) {
            (Some(c), Some(p)) => (c, p),
            _ => {
                self.errors.push(
                    demefit_err!(NetworkShape: "derive references unknown segment ({} from {})", child, parent),
                );
                return self;
            }
        };

        if !self.segments[c].parents.is_empty() {
            self.errors
                .push(demefit_err!(NetworkShape: "segment \"{}\" already has a parent", child));
            return self;
        }
        if self.segments[p].children.len() >= 2 {
            self.errors
                .push(demefit_err!(NetworkShape: "segment \"{}\" already has two children", parent));
            return self;
        }

        let parent_start = self.segments[p].start;
        match self.segments[c].end {
            None => self.segments[c].end = Some(parent_start),
            Some(end) if end == parent_start => {}
            Some(_) => {
                self.errors.push(
                    demefit_err!(NetworkShape: "date mismatch: \"{}\" does not end where \"{}\" begins", child, parent),
                );
                return self;
            }
        }

        self.segments[c].parents.push(p);
        self.segments[p].children.push(c);
        self
    }

    /// Give `child` two parents: lineages ascend to `introgressor` with
    /// probability `frac` and to `native` otherwise. Both parents must begin
    /// at the same time.
    pub fn mix(mut self, child: &str, frac: ParamId, introgressor: &str, native: &str) -> Self {
        let resolved = (
            self.by_name.get(child).copied(),
            self.by_name.get(introgressor).copied(),
            self.by_name.get(native).copied(),
        );
        let (c, i, n) = match resolved {
            (Some(c), Some(i), Some(n)) => (c, i, n),
            _ => {
                self.errors
                    .push(demefit_err!(NetworkShape: "mix references an unknown segment"));
                return self;
            }
        };

        if !self.segments[c].parents.is_empty() {
            self.errors
                .push(demefit_err!(NetworkShape: "segment \"{}\" already has a parent", child));
            return self;
        }
        for (ndx, role) in [(i, "introgressor"), (n, "native")] {
            if self.segments[ndx].children.len() >= 2 {
                self.errors.push(
                    demefit_err!(NetworkShape: "{} \"{}\" already has two children", role, self.segments[ndx].name),
                );
                return self;
            }
        }

        let native_start = self.segments[n].start;
        let intro_start = self.segments[i].start;
        if native_start != intro_start {
            self.errors.push(
                demefit_err!(NetworkShape: "mix parents \"{}\" and \"{}\" must begin at the same time",
                    self.segments[i].name, self.segments[n].name),
            );
            return self;
        }
        match self.segments[c].end {
            None => self.segments[c].end = Some(native_start),
            Some(end) if end == native_start => {}
            Some(_) => {
                self.errors.push(
                    demefit_err!(NetworkShape: "date mismatch: \"{}\" does not end where its parents begin", child),
                );
                return self;
            }
        }

        self.segments[c].parents.push(n);
        self.segments[c].parents.push(i);
        self.segments[c].mix = Some(frac);
        self.segments[n].children.push(c);
        self.segments[i].children.push(c);
        self
    }

    /// Validate the description against `store` and produce the network and
    /// its sample index.
    pub fn build(mut self, store: &ParamStore) -> DemefitResult<(PopNetwork, SampleIndex)> {
        if let Some(err) = self.errors.drain(..).next() {
            return Err(err);
        }
        if self.segments.is_empty() {
            demefit_bail!(NetworkShape: "network has no segments");
        }

        let mut root = None;
        for (i, seg) in self.segments.iter().enumerate() {
            if store.kind(seg.two_n) != ParamKind::TwoN {
                demefit_bail!(NetworkShape: "size of \"{}\" is not a twoN parameter", seg.name);
            }
            if store.kind(seg.start) != ParamKind::Time {
                demefit_bail!(NetworkShape: "start of \"{}\" is not a time parameter", seg.name);
            }
            if let Some(mix) = seg.mix {
                if store.kind(mix) != ParamKind::MixFrac {
                    demefit_bail!(NetworkShape: "mix of \"{}\" is not a mixFrac parameter", seg.name);
                }
            }

            for &p in &seg.parents {
                if store.value(seg.start) > store.value(self.segments[p].start) {
                    demefit_bail!(NetworkShape: "segment \"{}\" starts after its parent \"{}\"",
                        seg.name, self.segments[p].name);
                }
            }

            if seg.parents.is_empty() {
                match root {
                    None => root = Some(i),
                    Some(r) => demefit_bail!(NetworkShape: "multiple roots: \"{}\" and \"{}\"",
                        self.segments[r].name, seg.name),
                }
            }
        }
        let root = root.ok_or_else(|| demefit_err!(NetworkShape: "network has no root"))?;

        // Leaves-first topological order; anything left over is a cycle.
        let mut pending: Vec<usize> = self.segments.iter().map(|s| s.children.len()).collect();
        let mut ready: Vec<usize> = (0..self.segments.len()).filter(|&i| pending[i] == 0).collect();
        let mut topo = Vec::with_capacity(self.segments.len());
        while let Some(i) = ready.pop() {
            topo.push(i);
            for &p in &self.segments[i].parents {
                pending[p] -= 1;
                if pending[p] == 0 {
                    ready.push(p);
                }
            }
        }
        if topo.len() < self.segments.len() {
            demefit_bail!(NetworkShape: "population network contains a cycle");
        }

        let mut samples = SampleIndex::new();
        for (i, seg) in self.segments.iter().enumerate() {
            for k in 0..seg.samples {
                let label = if seg.samples == 1 {
                    seg.name.clone()
                } else {
                    format!("{}.{}", seg.name, k)
                };
                samples.add(i, &label)?;
            }
        }

        let segments = self
            .segments
            .into_iter()
            .map(|s| Segment {
                name: s.name,
                two_n: s.two_n,
                start: s.start,
                end: s.end,
                parents: s.parents,
                children: s.children,
                mix: s.mix,
                lineages: Vec::new(),
            })
            .collect();

        Ok((
            PopNetwork {
                segments,
                topo,
                root,
            },
            samples,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{ParamKind, ParamStore, ParamStoreBuilder};
    use demefit_error::ErrorCode;

    //      a--------|
    //               |ab--|
    //      b--------|    |abc--
    //      c-------------|
    //
    //  t = 0        1    3     inf
    fn three_leaf() -> (PopNetwork, SampleIndex, ParamStore) {
        let mut b = ParamStoreBuilder::new();
        let t0 = b.fixed("T0", ParamKind::Time, 0.0);
        let tab = b.free("Tab", ParamKind::Time, 1.0, 0.0, 100.0);
        let tabc = b.free("Tabc", ParamKind::Time, 3.0, 0.0, 100.0);
        let n = b.free("2N", ParamKind::TwoN, 10.0, 0.1, 1e6);
        let store = b.build().unwrap();

        let (net, samples) = PopNetwork::builder()
            .segment("a", n, t0)
            .segment("b", n, t0)
            .segment("c", n, t0)
            .segment("ab", n, tab)
            .segment("abc", n, tabc)
            .samples("a", 1)
            .samples("b", 1)
            .samples("c", 1)
            .derive("a", "ab")
            .derive("b", "ab")
            .derive("ab", "abc")
            .derive("c", "abc")
            .build(&store)
            .unwrap();

        (net, samples, store)
    }

    #[test]
    fn test_root_and_shape() {
        let (net, samples, _) = three_leaf();

        assert_eq!(net.n_segments(), 5);
        assert_eq!(net.segment(net.root()).name(), "abc");
        assert_eq!(samples.len(), 3);
        assert_eq!(samples.universe(), TipId(0b111));
    }

    #[test]
    fn test_topo_children_before_parents() {
        let (net, _, _) = three_leaf();

        let position: Vec<usize> = {
            let mut pos = vec![0; net.n_segments()];
            for (rank, &i) in net.topo_order().iter().enumerate() {
                pos[i] = rank;
            }
            pos
        };
        for i in 0..net.n_segments() {
            for &p in net.segment(i).parents() {
                assert!(position[i] < position[p]);
            }
        }
    }

    #[test]
    fn test_multiple_roots_rejected() {
        let mut b = ParamStoreBuilder::new();
        let t0 = b.fixed("T0", ParamKind::Time, 0.0);
        let n = b.free("2N", ParamKind::TwoN, 1.0, 0.1, 100.0);
        let store = b.build().unwrap();

        let err = PopNetwork::builder()
            .segment("a", n, t0)
            .segment("b", n, t0)
            .build(&store)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NetworkShape);
    }

    #[test]
    fn test_too_many_children_rejected() {
        let mut b = ParamStoreBuilder::new();
        let t0 = b.fixed("T0", ParamKind::Time, 0.0);
        let t1 = b.fixed("T1", ParamKind::Time, 1.0);
        let n = b.free("2N", ParamKind::TwoN, 1.0, 0.1, 100.0);
        let store = b.build().unwrap();

        let err = PopNetwork::builder()
            .segment("a", n, t0)
            .segment("b", n, t0)
            .segment("c", n, t0)
            .segment("p", n, t1)
            .derive("a", "p")
            .derive("b", "p")
            .derive("c", "p")
            .build(&store)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NetworkShape);
    }

    #[test]
    fn test_child_older_than_parent_rejected() {
        let mut b = ParamStoreBuilder::new();
        let t2 = b.fixed("T2", ParamKind::Time, 2.0);
        let t1 = b.fixed("T1", ParamKind::Time, 1.0);
        let n = b.free("2N", ParamKind::TwoN, 1.0, 0.1, 100.0);
        let store = b.build().unwrap();

        let err = PopNetwork::builder()
            .segment("a", n, t2)
            .segment("p", n, t1)
            .derive("a", "p")
            .build(&store)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NetworkShape);
    }

    #[test]
    fn test_wrong_param_kind_rejected() {
        let mut b = ParamStoreBuilder::new();
        let t0 = b.fixed("T0", ParamKind::Time, 0.0);
        let bogus = b.free("notN", ParamKind::Time, 1.0, 0.0, 100.0);
        let store = b.build().unwrap();

        assert!(
            PopNetwork::builder()
                .segment("a", bogus, t0)
                .build(&store)
                .is_err()
        );
    }

    #[test]
    fn test_inject_and_clear() {
        let (mut net, samples, _) = three_leaf();

        assert!(net.is_clear());
        net.inject_samples(&samples);
        assert!(!net.is_clear());

        let injected: usize = (0..net.n_segments())
            .map(|i| net.segment(i).lineages.len())
            .sum();
        assert_eq!(injected, 3);

        net.clear_samples();
        assert!(net.is_clear());
    }

    #[test]
    fn test_feasible_monotone_in_bounds() {
        let (net, _, store) = three_leaf();

        let narrow = Bounds {
            lo_two_n: 1.0,
            hi_two_n: 100.0,
            lo_time: 0.0,
            hi_time: 10.0,
        };
        let wide = Bounds {
            lo_two_n: 0.0,
            hi_two_n: 1e6,
            lo_time: 0.0,
            hi_time: 1e3,
        };

        assert!(net.feasible(&store, &narrow));
        assert!(net.feasible(&store, &wide));

        let tight = Bounds {
            lo_two_n: 0.0,
            hi_two_n: 5.0,
            lo_time: 0.0,
            hi_time: 10.0,
        };
        assert!(!net.feasible(&store, &tight));
    }

    #[test]
    fn test_feasible_rejects_inverted_times() {
        let (net, _, mut store) = three_leaf();

        // push the younger split above the older one
        store.set_free_vector(&[5.0, 3.0, 10.0]).unwrap();
        assert!(!net.feasible(&store, &Bounds::default()));
    }

    #[test]
    fn test_admixture_shape() {
        let mut b = ParamStoreBuilder::new();
        let t0 = b.fixed("T0", ParamKind::Time, 0.0);
        let tm = b.fixed("Tm", ParamKind::Time, 1.0);
        let t2 = b.fixed("T2", ParamKind::Time, 2.0);
        let m = b.free("m", ParamKind::MixFrac, 0.3, 0.0, 1.0);
        let n = b.free("2N", ParamKind::TwoN, 1.0, 0.1, 100.0);
        let store = b.build().unwrap();

        let (net, _) = PopNetwork::builder()
            .segment("c", n, t0)
            .segment("nat", n, tm)
            .segment("intro", n, tm)
            .segment("anc", n, t2)
            .samples("c", 1)
            .mix("c", m, "intro", "nat")
            .derive("nat", "anc")
            .derive("intro", "anc")
            .build(&store)
            .unwrap();

        let c = (0..net.n_segments())
            .find(|&i| net.segment(i).name() == "c")
            .unwrap();
        assert_eq!(net.segment(c).parents().len(), 2);
        assert!(net.segment(c).mix().is_some());
        assert_eq!(net.segment(net.root()).name(), "anc");
    }

    #[test]
    fn test_mix_parents_must_align() {
        let mut b = ParamStoreBuilder::new();
        let t0 = b.fixed("T0", ParamKind::Time, 0.0);
        let t1 = b.fixed("T1", ParamKind::Time, 1.0);
        let t2 = b.fixed("T2", ParamKind::Time, 2.0);
        let m = b.free("m", ParamKind::MixFrac, 0.3, 0.0, 1.0);
        let n = b.free("2N", ParamKind::TwoN, 1.0, 0.1, 100.0);
        let store = b.build().unwrap();

        let err = PopNetwork::builder()
            .segment("c", n, t0)
            .segment("nat", n, t1)
            .segment("intro", n, t2)
            .mix("c", m, "intro", "nat")
            .build(&store)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NetworkShape);
    }
}
