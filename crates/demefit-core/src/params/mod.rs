//! Typed parameter registry.
//!
//! Every number a [crate::network::PopNetwork] reads — an effective size, an
//! epoch boundary, an admixture fraction — lives in a [ParamStore] and is
//! addressed through an opaque [ParamId]. Parameters are free (the
//! optimizer's search space), fixed, or constrained by a formula over other
//! parameters. Writing the free subvector recomputes every constrained value
//! in dependency order, so reads through an id always observe a consistent
//! state.

mod formula;

pub use formula::Formula;

use demefit_error::{DemefitResult, demefit_bail, ensure};
use std::collections::HashMap;

/// Opaque handle to a parameter within one [ParamStore] (and all of its
/// clones).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ParamId(pub(crate) usize);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ParamKind {
    /// Haploid effective population size times two.
    TwoN,
    /// An epoch boundary, in coalescent time units.
    Time,
    /// An admixture fraction in [0, 1].
    MixFrac,
    Arbitrary,
}

/// Global feasibility box shared by every parameter of a given kind, on top
/// of each parameter's own bounds.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bounds {
    pub lo_two_n: f64,
    pub hi_two_n: f64,
    pub lo_time: f64,
    pub hi_time: f64,
}

impl Default for Bounds {
    fn default() -> Self {
        Bounds {
            lo_two_n: 0.0,
            hi_two_n: 1e7,
            lo_time: 0.0,
            hi_time: f64::INFINITY,
        }
    }
}

#[derive(Clone, Debug)]
enum Role {
    Free,
    Fixed,
    Constrained(Formula),
}

#[derive(Clone, Debug)]
struct Param {
    name: String,
    low: f64,
    high: f64,
    kind: ParamKind,
    role: Role,
}

struct ParamDecl {
    name: String,
    value: f64,
    low: f64,
    high: f64,
    kind: ParamKind,
    formula: Option<String>,
    free: bool,
}

/// Collects parameter declarations and validates them into a [ParamStore].
///
/// Ids are handed out at declaration time and stay valid in the built store
/// and every clone of it.
#[derive(Default)]
pub struct ParamStoreBuilder {
    decls: Vec<ParamDecl>,
}

impl ParamStoreBuilder {
    pub fn new() -> Self {
        ParamStoreBuilder::default()
    }

    /// Declare a free parameter: part of the optimizer's search space.
    pub fn free(&mut self, name: &str, kind: ParamKind, value: f64, low: f64, high: f64) -> ParamId {
        self.push(ParamDecl {
            name: name.to_string(),
            value,
            low,
            high,
            kind,
            formula: None,
            free: true,
        })
    }

    /// Declare a fixed parameter. Its bounds collapse onto the value.
    pub fn fixed(&mut self, name: &str, kind: ParamKind, value: f64) -> ParamId {
        self.push(ParamDecl {
            name: name.to_string(),
            value,
            low: value,
            high: value,
            kind,
            formula: None,
            free: false,
        })
    }

    /// Declare a constrained parameter computed from `formula`. The formula
    /// may reference any other declared parameter, including ones declared
    /// later; it is parsed and checked when the store is built.
    pub fn constrained(&mut self, name: &str, kind: ParamKind, formula: &str) -> ParamId {
        let (low, high) = match kind {
            ParamKind::MixFrac => (0.0, 1.0),
            ParamKind::Time => (0.0, f64::INFINITY),
            _ => (f64::NEG_INFINITY, f64::INFINITY),
        };
        self.push(ParamDecl {
            name: name.to_string(),
            value: 0.0,
            low,
            high,
            kind,
            formula: Some(formula.to_string()),
            free: false,
        })
    }

    fn push(&mut self, decl: ParamDecl) -> ParamId {
        self.decls.push(decl);
        ParamId(self.decls.len() - 1)
    }

    pub fn build(self) -> DemefitResult<ParamStore> {
        let mut by_name = HashMap::new();
        for (i, decl) in self.decls.iter().enumerate() {
            if by_name.insert(decl.name.clone(), i).is_some() {
                demefit_bail!(InvalidConfig: "duplicate parameter \"{}\"", decl.name);
            }
        }

        let mut params = Vec::with_capacity(self.decls.len());
        let mut values = Vec::with_capacity(self.decls.len());
        let mut free = Vec::new();

        for (i, decl) in self.decls.iter().enumerate() {
            if decl.formula.is_none() {
                ensure!(
                    decl.low <= decl.value && decl.value <= decl.high,
                    InvalidParameter: "\"{}\" = {} is outside [{}, {}]",
                    decl.name, decl.value, decl.low, decl.high
                );
            }
            match decl.kind {
                ParamKind::MixFrac => ensure!(
                    decl.low >= 0.0 && decl.high <= 1.0,
                    InvalidParameter: "mix fraction \"{}\" must stay in [0, 1]", decl.name
                ),
                ParamKind::Time => ensure!(
                    decl.low >= 0.0,
                    InvalidParameter: "time \"{}\" must be non-negative", decl.name
                ),
                _ => {}
            }

            let role = match &decl.formula {
                None if decl.free => Role::Free,
                None => Role::Fixed,
                Some(text) => {
                    let lookup = |name: &str| by_name.get(name).copied();
                    let parsed = Formula::parse(text, &lookup)?;
                    if parsed.deps().contains(&i) {
                        demefit_bail!(NetworkShape: "parameter \"{}\" depends on itself", decl.name);
                    }
                    Role::Constrained(parsed)
                }
            };
            if decl.free {
                free.push(i);
            }

            params.push(Param {
                name: decl.name.clone(),
                low: decl.low,
                high: decl.high,
                kind: decl.kind,
                role,
            });
            values.push(decl.value);
        }

        let eval_order = constrained_order(&params)?;

        let mut store = ParamStore {
            params,
            values,
            free,
            eval_order,
            by_name,
        };
        store.recompute_constrained();
        Ok(store)
    }
}

/// Order the constrained parameters so every one is evaluated after the
/// constrained parameters it reads. Cycles are a construction-time error.
fn constrained_order(params: &[Param]) -> DemefitResult<Vec<usize>> {
    const WHITE: u8 = 0;
    const GRAY: u8 = 1;
    const BLACK: u8 = 2;

    fn visit(
        i: usize,
        params: &[Param],
        color: &mut [u8],
        order: &mut Vec<usize>,
    ) -> DemefitResult<()> {
        match color[i] {
            BLACK => return Ok(()),
            GRAY => {
                demefit_bail!(NetworkShape: "constraint cycle through parameter \"{}\"", params[i].name)
            }
            _ => {}
        }
        color[i] = GRAY;
        if let Role::Constrained(formula) = &params[i].role {
            for &dep in formula.deps() {
                if matches!(params[dep].role, Role::Constrained(_)) {
                    visit(dep, params, color, order)?;
                }
            }
            order.push(i);
        }
        color[i] = BLACK;
        Ok(())
    }

    let mut color = vec![WHITE; params.len()];
    let mut order = Vec::new();
    for i in 0..params.len() {
        if matches!(params[i].role, Role::Constrained(_)) {
            visit(i, params, &mut color, &mut order)?;
        }
    }
    Ok(order)
}

/// The parameter registry. See the module docs.
#[derive(Clone, Debug)]
pub struct ParamStore {
    params: Vec<Param>,
    values: Vec<f64>,
    free: Vec<usize>,
    eval_order: Vec<usize>,
    by_name: HashMap<String, usize>,
}

impl ParamStore {
    pub fn builder() -> ParamStoreBuilder {
        ParamStoreBuilder::new()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Dimension of the optimizer's search space.
    pub fn n_free(&self) -> usize {
        self.free.len()
    }

    pub fn id(&self, name: &str) -> Option<ParamId> {
        self.by_name.get(name).copied().map(ParamId)
    }

    #[inline]
    pub fn value(&self, id: ParamId) -> f64 {
        self.values[id.0]
    }

    pub fn bounds(&self, id: ParamId) -> (f64, f64) {
        let p = &self.params[id.0];
        (p.low, p.high)
    }

    pub fn name(&self, id: ParamId) -> &str {
        &self.params[id.0].name
    }

    pub fn kind(&self, id: ParamId) -> ParamKind {
        self.params[id.0].kind
    }

    /// True iff the parameter's current value lies within its own bounds.
    pub fn in_bounds(&self, id: ParamId) -> bool {
        let p = &self.params[id.0];
        let v = self.values[id.0];
        p.low <= v && v <= p.high
    }

    /// The free subvector, in declaration order.
    pub fn free_vector(&self) -> Vec<f64> {
        self.free.iter().map(|&i| self.values[i]).collect()
    }

    pub fn free_names(&self) -> Vec<String> {
        self.free.iter().map(|&i| self.params[i].name.clone()).collect()
    }

    pub fn free_bounds(&self) -> Vec<(f64, f64)> {
        self.free
            .iter()
            .map(|&i| (self.params[i].low, self.params[i].high))
            .collect()
    }

    /// Replace the free subvector and recompute constrained values.
    ///
    /// Every component is checked against its bounds before anything is
    /// written, so a rejected vector leaves the store untouched.
    pub fn set_free_vector(&mut self, x: &[f64]) -> DemefitResult<()> {
        ensure!(
            x.len() == self.free.len(),
            InvalidParameter: "expected {} free values, got {}", self.free.len(), x.len()
        );
        for (&v, &i) in x.iter().zip(self.free.iter()) {
            let p = &self.params[i];
            ensure!(
                p.low <= v && v <= p.high,
                InvalidParameter: "\"{}\" = {} is outside [{}, {}]", p.name, v, p.low, p.high
            );
        }
        for (&v, &i) in x.iter().zip(self.free.iter()) {
            self.values[i] = v;
        }
        self.recompute_constrained();
        Ok(())
    }

    /// Re-evaluate every constrained parameter in dependency order.
    pub fn recompute_constrained(&mut self) {
        for k in 0..self.eval_order.len() {
            let i = self.eval_order[k];
            let v = match &self.params[i].role {
                Role::Constrained(formula) => formula.eval(&self.values),
                _ => unreachable!("eval_order holds constrained parameters only"),
            };
            self.values[i] = v;
        }
    }
}
