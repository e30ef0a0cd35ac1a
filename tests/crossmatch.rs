//! End-to-end crossmatch scenarios: the join-driver control flow (index
//! pass, candidate lookup, exact score filter) run over both geometries,
//! checked against brute-force all-pairs references.

use std::collections::HashSet;
use std::f64::consts::PI;

use crossmatch::{
    long_binner_for_row_count, CartesianConfig, CartesianMatchEngine, ErrorCartesianConfig,
    ErrorCartesianMatchEngine, ErrorSkyConfig, ErrorSkyMatchEngine, MatchEngine, ObjectBinner,
    SkyConfig, SkyMatchEngine, Tuple,
};

/// The external join-driver loop: index table A by its bin labels, then
/// probe with each row of table B and keep candidate pairs that pass the
/// exact score. Returns `(row_a, row_b, score)` triples.
fn crossmatch_tables(
    engine: &dyn MatchEngine,
    table_a: &[Tuple],
    table_b: &[Tuple],
) -> Vec<(usize, usize, f64)> {
    let mut binner = long_binner_for_row_count(table_a.len() as u64);
    for (row, tuple) in table_a.iter().enumerate() {
        for cell in engine.bins(tuple) {
            binner.add_item(cell, row as u64);
        }
    }

    let mut pairs = Vec::new();
    for (row_b, tuple_b) in table_b.iter().enumerate() {
        let mut candidates: HashSet<u64> = HashSet::new();
        for cell in engine.bins(tuple_b) {
            if let Some(rows) = binner.longs(&cell) {
                candidates.extend(rows);
            }
        }
        for row_a in candidates {
            if let Some(score) = engine.match_score(&table_a[row_a as usize], tuple_b) {
                pairs.push((row_a as usize, row_b, score));
            }
        }
    }
    pairs.sort_by(|x, y| (x.0, x.1).cmp(&(y.0, y.1)));
    pairs
}

/// Reference: exhaustive all-pairs scan through the same engine score.
fn brute_force_pairs(
    engine: &dyn MatchEngine,
    table_a: &[Tuple],
    table_b: &[Tuple],
) -> Vec<(usize, usize, f64)> {
    let mut pairs = Vec::new();
    for (row_a, tuple_a) in table_a.iter().enumerate() {
        for (row_b, tuple_b) in table_b.iter().enumerate() {
            if let Some(score) = engine.match_score(tuple_a, tuple_b) {
                pairs.push((row_a, row_b, score));
            }
        }
    }
    pairs
}

#[test]
fn cartesian_join_finds_expected_pairs() {
    let engine = CartesianMatchEngine::new(CartesianConfig::new(2, 1.0)).unwrap();
    let table_a = vec![
        Tuple::from_f64s(&[0.0, 0.0]),
        Tuple::from_f64s(&[10.0, 10.0]),
        Tuple::from_f64s(&[20.0, 0.0]),
    ];
    let table_b = vec![
        Tuple::from_f64s(&[0.5, 0.5]),   // matches row 0
        Tuple::from_f64s(&[10.0, 10.9]), // matches row 1
        Tuple::from_f64s(&[15.0, 15.0]), // matches nothing
        Tuple::from_f64s(&[f64::NAN, 0.0]),
    ];

    let pairs = crossmatch_tables(&engine, &table_a, &table_b);
    let keys: Vec<(usize, usize)> = pairs.iter().map(|p| (p.0, p.1)).collect();
    assert_eq!(keys, vec![(0, 0), (1, 1)]);
    assert!((pairs[0].2 - 0.5_f64.hypot(0.5)).abs() < 1e-12);
    assert!((pairs[1].2 - 0.9).abs() < 1e-12);
}

#[test]
fn random_cartesian_join_matches_brute_force() {
    let mut rng = fastrand::Rng::with_seed(0xd00d);
    let engine = CartesianMatchEngine::new(CartesianConfig::new(2, 1.0)).unwrap();
    let random_table = |rng: &mut fastrand::Rng, n: usize| -> Vec<Tuple> {
        (0..n)
            .map(|_| Tuple::from_f64s(&[rng.f64() * 30.0, rng.f64() * 30.0]))
            .collect()
    };
    let table_a = random_table(&mut rng, 200);
    let table_b = random_table(&mut rng, 200);

    let indexed = crossmatch_tables(&engine, &table_a, &table_b);
    let reference = brute_force_pairs(&engine, &table_a, &table_b);
    assert_eq!(indexed, reference);
    assert!(!reference.is_empty(), "seed produced no pairs at all");
}

#[test]
fn random_error_cartesian_join_matches_brute_force() {
    let mut rng = fastrand::Rng::with_seed(0xbeef);
    let engine = ErrorCartesianMatchEngine::new(ErrorCartesianConfig::new(2, 1.0)).unwrap();
    let random_table = |rng: &mut fastrand::Rng, n: usize| -> Vec<Tuple> {
        (0..n)
            .map(|_| Tuple::from_f64s(&[rng.f64() * 30.0, rng.f64() * 30.0, rng.f64()]))
            .collect()
    };
    let table_a = random_table(&mut rng, 200);
    let table_b = random_table(&mut rng, 200);

    let indexed = crossmatch_tables(&engine, &table_a, &table_b);
    let reference = brute_force_pairs(&engine, &table_a, &table_b);
    assert_eq!(indexed, reference);
    assert!(!reference.is_empty(), "seed produced no pairs at all");
}

#[test]
fn random_sky_join_matches_brute_force() {
    let mut rng = fastrand::Rng::with_seed(0x57a6);
    let engine = SkyMatchEngine::new(SkyConfig::new(0.002)).unwrap();
    let random_table = |rng: &mut fastrand::Rng, n: usize| -> Vec<Tuple> {
        (0..n)
            .map(|_| {
                // A small patch so pairs actually occur, away from the pole.
                let ra = 1.0 + rng.f64() * 0.05;
                let dec = 0.8 + rng.f64() * 0.05;
                Tuple::from_f64s(&[ra, dec])
            })
            .collect()
    };
    let table_a = random_table(&mut rng, 200);
    let table_b = random_table(&mut rng, 200);

    let indexed = crossmatch_tables(&engine, &table_a, &table_b);
    let reference = brute_force_pairs(&engine, &table_a, &table_b);
    assert_eq!(indexed, reference);
    assert!(!reference.is_empty(), "seed produced no pairs at all");
}

#[test]
fn random_error_sky_join_matches_brute_force() {
    let mut rng = fastrand::Rng::with_seed(0x901e);
    // Per-row radii up to five times the guide scale, with half the rows
    // crowding the north pole where RA spans blow up.
    let engine = ErrorSkyMatchEngine::new(ErrorSkyConfig::new(0.01)).unwrap();
    let random_table = |rng: &mut fastrand::Rng, n: usize| -> Vec<Tuple> {
        (0..n)
            .map(|i| {
                let (ra, dec) = if i % 2 == 0 {
                    (rng.f64() * 2.0 * PI, PI / 2.0 - rng.f64() * 0.2)
                } else {
                    (rng.f64() * 0.3, (rng.f64() - 0.5) * 0.6)
                };
                Tuple::from_f64s(&[ra, dec, rng.f64() * 0.05])
            })
            .collect()
    };
    let table_a = random_table(&mut rng, 150);
    let table_b = random_table(&mut rng, 150);

    let indexed = crossmatch_tables(&engine, &table_a, &table_b);
    let reference = brute_force_pairs(&engine, &table_a, &table_b);
    assert_eq!(indexed, reference);
    assert!(!reference.is_empty(), "seed produced no pairs at all");
}

#[test]
fn sky_join_scores_in_arcseconds() {
    let deg = PI / 180.0;
    let engine = SkyMatchEngine::new(SkyConfig::new(0.01 * deg)).unwrap();
    let table_a = vec![
        Tuple::from_f64s(&[10.0 * deg, -30.0 * deg]),
        Tuple::from_f64s(&[11.0 * deg, -30.0 * deg]),
    ];
    let table_b = vec![Tuple::from_f64s(&[10.0 * deg, -30.001 * deg])];

    let pairs = crossmatch_tables(&engine, &table_a, &table_b);
    assert_eq!(pairs.len(), 1);
    assert_eq!((pairs[0].0, pairs[0].1), (0, 0));
    assert!((pairs[0].2 - 3.6).abs() < 1e-6);
}

#[test]
fn object_binner_driver_agrees_with_long_binner() {
    // A driver holding opaque row handles instead of raw indices.
    let engine = CartesianMatchEngine::new(CartesianConfig::new(2, 1.0)).unwrap();
    let table_a = vec![
        Tuple::from_f64s(&[0.0, 0.0]),
        Tuple::from_f64s(&[0.4, 0.4]),
        Tuple::from_f64s(&[30.0, 30.0]),
    ];
    let probe = Tuple::from_f64s(&[0.2, 0.2]);

    let mut binner: ObjectBinner<_, usize> = ObjectBinner::new();
    for (row, tuple) in table_a.iter().enumerate() {
        for cell in engine.bins(tuple) {
            binner.add_item(cell, row);
        }
    }
    assert_eq!(binner.item_count(), {
        let mut total = 0;
        for tuple in &table_a {
            total += engine.bins(tuple).len() as u64;
        }
        total
    });

    let mut candidates: HashSet<usize> = HashSet::new();
    for cell in engine.bins(&probe) {
        candidates.extend(binner.items(&cell));
    }
    let mut matched: Vec<usize> = candidates
        .into_iter()
        .filter(|&row| engine.match_score(&probe, &table_a[row]).is_some())
        .collect();
    matched.sort_unstable();
    assert_eq!(matched, vec![0, 1]);
}

#[test]
fn tuning_surface_is_uniform_across_engines() {
    let mut engines: Vec<Box<dyn MatchEngine>> = vec![
        Box::new(CartesianMatchEngine::new(CartesianConfig::new(3, 0.5)).unwrap()),
        Box::new(ErrorCartesianMatchEngine::new(ErrorCartesianConfig::new(2, 0.5)).unwrap()),
        Box::new(SkyMatchEngine::new(SkyConfig::new(0.001)).unwrap()),
    ];

    for engine in engines.iter_mut() {
        let params = engine.tuning_parameters();
        assert!(!params.is_empty(), "{} exposes no knobs", engine.name());
        // A driver can rewrite every knob by name with no engine-specific
        // code, and bad values fail fast.
        for param in &params {
            engine
                .set_tuning_parameter(&param.info.name, param.value)
                .expect("round-tripping a knob value");
            assert!(engine
                .set_tuning_parameter(&param.info.name, -1.0)
                .is_err());
        }
        assert!(engine.set_tuning_parameter("no such knob", 1.0).is_err());
        assert!(!engine.tuple_infos().is_empty());
    }
}
