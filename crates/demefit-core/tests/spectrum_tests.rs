use demefit_core::*;

//      a--------|
//               |ab--|
//      b--------|    |abc--
//      c-------------|
//
//  t = 0        1    3      inf
fn balanced_three_leaf(two_n: f64) -> (PopNetwork, SampleIndex, ParamStore) {
    let mut b = ParamStoreBuilder::new();
    let t0 = b.fixed("T0", ParamKind::Time, 0.0);
    let tab = b.free("Tab", ParamKind::Time, 1.0, 0.0, 100.0);
    let tabc = b.free("Tabc", ParamKind::Time, 3.0, 0.0, 100.0);
    let n = b.free("2N", ParamKind::TwoN, two_n, 0.01, 1e6);
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

fn evaluator_for(
    net: PopNetwork,
    samples: SampleIndex,
    store: ParamStore,
    observed: PatternTable,
    config: EvalConfig,
) -> SpectrumEvaluator {
    SpectrumEvaluator::new(net, store, samples, observed, Bounds::default(), config).unwrap()
}

const AB: TipId = TipId(0b011);
const AC: TipId = TipId(0b101);
const BC: TipId = TipId(0b110);

#[test]
fn balanced_tree_pattern_frequencies() {
    let (net, samples, store) = balanced_three_leaf(20.0);
    let placeholder: PatternTable = [(AB, 1.0), (AC, 1.0), (BC, 1.0)].into_iter().collect();

    let mut eval = evaluator_for(
        net,
        samples,
        store,
        placeholder,
        EvalConfig {
            seed: 42,
            tasks: 1,
            ..EvalConfig::default()
        },
    );

    let spectrum = eval.sample_spectrum(&[1.0, 3.0, 20.0], 10_000).unwrap();

    // only the three pair patterns are informative for three samples
    assert_eq!(spectrum.len(), 3);
    for &pat in &[AB, AC, BC] {
        let freq = spectrum.get(pat);
        assert!(
            (0.25..=0.45).contains(&freq),
            "pattern {:?} has frequency {}",
            pat,
            freq
        );
    }

    // sisters share more drift time than either does with the outgroup
    assert!(spectrum.get(AB) > spectrum.get(AC));
    assert!(spectrum.get(AB) > spectrum.get(BC));
}

//      a0---|a1--------|
//           :          |ab--|
//      b----+----------|    |abc--
//           :               |
//      c0---|c1-------------|
//
//  t = 0   0.5         1    3      inf
//
// c0 is admixed: at t=0.5 its lineage ascends into a1 with probability m.
fn admixed_three_leaf() -> (PopNetwork, SampleIndex, ParamStore) {
    let mut b = ParamStoreBuilder::new();
    let t0 = b.fixed("T0", ParamKind::Time, 0.0);
    let tm = b.fixed("Tm", ParamKind::Time, 0.5);
    let tab = b.fixed("Tab", ParamKind::Time, 1.0);
    let tabc = b.fixed("Tabc", ParamKind::Time, 3.0);
    let n = b.fixed("2N", ParamKind::TwoN, 1.0);
    let m = b.free("mAC", ParamKind::MixFrac, 0.0, 0.0, 1.0);
    let store = b.build().unwrap();

    let (net, samples) = PopNetwork::builder()
        .segment("a0", n, t0)
        .segment("b", n, t0)
        .segment("c0", n, t0)
        .segment("a1", n, tm)
        .segment("c1", n, tm)
        .segment("ab", n, tab)
        .segment("abc", n, tabc)
        .samples("a0", 1)
        .samples("b", 1)
        .samples("c0", 1)
        .derive("a0", "a1")
        .mix("c0", m, "a1", "c1")
        .derive("a1", "ab")
        .derive("b", "ab")
        .derive("ab", "abc")
        .derive("c1", "abc")
        .build(&store)
        .unwrap();

    (net, samples, store)
}

#[test]
fn admixture_shifts_mass_toward_donor() {
    let (net, samples, store) = admixed_three_leaf();
    let placeholder: PatternTable = [(AB, 1.0), (AC, 1.0), (BC, 1.0)].into_iter().collect();

    let mut eval = evaluator_for(
        net,
        samples,
        store,
        placeholder,
        EvalConfig {
            seed: 1234,
            tasks: 1,
            ..EvalConfig::default()
        },
    );

    let no_flow = eval.sample_spectrum(&[0.0], 50_000).unwrap();
    let strong_flow = eval.sample_spectrum(&[0.9], 50_000).unwrap();

    let ratio_none = no_flow.get(AC) / no_flow.get(BC);
    let ratio_strong = strong_flow.get(AC) / strong_flow.get(BC);

    // without gene flow a and b are exchangeable with respect to c
    assert!(
        (0.8..=1.25).contains(&ratio_none),
        "symmetric ratio was {}",
        ratio_none
    );
    // gene flow from a into c inflates a:c sharing
    assert!(
        ratio_strong > 1.5 * ratio_none,
        "ratio went from {} to {}",
        ratio_none,
        ratio_strong
    );
}

#[test]
fn cost_near_zero_at_generating_parameters() {
    let truth = [1.0, 3.0, 20.0];

    // observed spectrum: a long simulation at the generating parameters
    let (net, samples, store) = balanced_three_leaf(20.0);
    let placeholder: PatternTable = [(AB, 1.0), (AC, 1.0), (BC, 1.0)].into_iter().collect();
    let mut generator = evaluator_for(
        net,
        samples,
        store,
        placeholder,
        EvalConfig {
            seed: 5,
            tasks: 2,
            ..EvalConfig::default()
        },
    );
    let observed = generator.sample_spectrum(&truth, 100_000).unwrap();

    // an independent evaluator scores the truth against that spectrum
    let (net, samples, store) = balanced_three_leaf(20.0);
    let mut eval = evaluator_for(
        net,
        samples,
        store,
        observed,
        EvalConfig {
            seed: 99,
            tasks: 2,
            replicates: 100_000,
            cost: CostKind::Kl,
            ..EvalConfig::default()
        },
    );

    let cost = eval.cost(&truth);
    assert!(cost.is_finite());
    assert!(cost >= 0.0);
    assert!(cost < 0.01, "KL at the generating parameters was {}", cost);
}

#[test]
fn evaluation_is_pure() {
    let config = EvalConfig {
        seed: 31,
        tasks: 4,
        replicates: 2_000,
        ..EvalConfig::default()
    };
    let x = [1.0, 3.0, 20.0];

    let run = |config: EvalConfig| {
        let (net, samples, store) = balanced_three_leaf(20.0);
        let placeholder: PatternTable = [(AB, 1.0), (AC, 1.0), (BC, 1.0)].into_iter().collect();
        let mut eval = evaluator_for(net, samples, store, placeholder, config);
        eval.cost(&x)
    };

    let first = run(config.clone());
    let second = run(config);
    assert_eq!(first, second);
}

#[test]
fn infeasible_vector_is_rejected_before_simulation() {
    let (net, samples, store) = balanced_three_leaf(20.0);
    let placeholder: PatternTable = [(AB, 1.0), (AC, 1.0), (BC, 1.0)].into_iter().collect();
    let mut eval = evaluator_for(
        net,
        samples,
        store,
        placeholder,
        EvalConfig {
            tasks: 2,
            ..EvalConfig::default()
        },
    );

    // Tab above Tabc inverts a branch: inside per-parameter bounds but
    // structurally infeasible, so no simulation work may be dispatched
    let cost = eval.cost(&[5.0, 3.0, 20.0]);
    assert_eq!(cost, f64::INFINITY);
    assert_eq!(eval.jobs_submitted(), 0);
}
