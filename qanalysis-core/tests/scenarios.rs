//! End-to-end scenarios for the queue model, root finder and analyzer.

use pretty_assertions::assert_eq;
use qanalysis_core::{
    BirthDeathModel, CompositionPolicy, DecodeParms, Indicator, PrefillParms, QueueAnalyzer,
    QueueConfig, QueueError, RequestSize, ServiceParms, ServiceRateProfile, TargetMetric,
    TargetPerf, binary_search,
};

/// τ(n) = 1.0 + 0.5·n, N = 10.
fn reference_profile() -> ServiceRateProfile {
    let rates = (1..=10)
        .map(|n| n as f64 / (1.0 + 0.5 * n as f64))
        .collect();
    ServiceRateProfile::new(rates).unwrap()
}

/// The reference profile behind an analyzer: one output token per request,
/// no prefill, K = 100.
fn reference_analyzer() -> QueueAnalyzer {
    let config = QueueConfig {
        max_batch_size: 10,
        max_queue_size: 90,
        service: ServiceParms {
            prefill: PrefillParms {
                gamma: 0.0,
                delta: 0.0,
            },
            decode: DecodeParms {
                alpha: 1.0,
                beta: 0.5,
            },
        },
        policy: CompositionPolicy::DecodeOnly,
        ..QueueConfig::default()
    };
    let size = RequestSize {
        avg_input_tokens: 0,
        avg_output_tokens: 1,
    };
    QueueAnalyzer::new(config, size).unwrap()
}

#[test]
fn scenario_a_light_load() {
    let mut model = BirthDeathModel::new(100, reference_profile()).unwrap();
    model.solve(1.0, 1);
    assert!(model.is_valid());

    let stats = model.stats().unwrap();
    assert!(stats.avg_num_in_system.is_finite() && stats.avg_num_in_system > 0.0);
    assert!(stats.avg_wait_time.is_finite() && stats.avg_wait_time > 0.0);
    assert!((stats.throughput - 1.0).abs() < 1e-9);
    assert!((stats.avg_num_in_system - 3.0101).abs() < 1e-3);
}

#[test]
fn scenario_b_service_time_search() {
    let profile = reference_profile();
    let lo = profile.first() * 0.001;
    let hi = profile.last() * 0.999;
    let mut model = BirthDeathModel::new(100, profile).unwrap();

    let found = binary_search(lo, hi, 2.0, |lambda| {
        model.solve(lambda, 1);
        model.stats().map(|s| s.avg_serv_time)
    })
    .unwrap();

    assert_eq!(found.indicator, Indicator::Interior);
    assert!(found.x > lo && found.x < hi);
    assert!((found.value - 2.0).abs() < 1e-5);

    model.solve(found.x, 1);
    assert!((model.stats().unwrap().avg_serv_time - 2.0).abs() < 1e-5);
}

#[test]
fn scenario_c_binding_constraint() {
    let analyzer = reference_analyzer();
    // TTFT here is the pure queueing delay; 1 ms of it allows ~1388 req/s,
    // while ITL <= 2.5 ms (mean batch of 3) allows only ~1000 req/s.
    let targets = TargetPerf {
        ttft: Some(1.0),
        itl: Some(2.5),
        tps: None,
    };
    let sized = analyzer.size(&targets).unwrap();

    let ttft_rate = sized
        .per_target
        .iter()
        .find(|t| t.metric == TargetMetric::Ttft)
        .and_then(|t| t.rate)
        .unwrap();
    let itl_rate = sized
        .per_target
        .iter()
        .find(|t| t.metric == TargetMetric::Itl)
        .and_then(|t| t.rate)
        .unwrap();

    assert!(ttft_rate > itl_rate);
    assert_eq!(sized.binding, TargetMetric::Itl);
    assert_eq!(sized.rate, itl_rate);
    assert!((sized.achieved.itl.unwrap() - 2.5).abs() < 1e-4);
    assert!(sized.achieved.ttft.unwrap() < 1.0);
    assert!(sized.achieved.tps.is_none());
}

#[test]
fn degenerate_zero_rate() {
    let mut model = BirthDeathModel::new(100, reference_profile()).unwrap();
    model.solve(0.0, 1);
    assert!(!model.is_valid());
    assert!(matches!(
        model.stats(),
        Err(QueueError::NumericalInvalidity(_))
    ));
}

#[test]
fn wait_and_occupancy_increase_with_load() {
    let mut model = BirthDeathModel::new(100, reference_profile()).unwrap();
    let mut previous: Option<(f64, f64)> = None;
    for step in 1..=16 {
        let lambda = 0.1 * step as f64;
        model.solve(lambda, 1);
        let stats = model.stats().unwrap();
        if let Some((wait, in_system)) = previous {
            assert!(stats.avg_wait_time > wait, "wait not increasing at {}", lambda);
            assert!(stats.avg_num_in_system > in_system);
        }
        previous = Some((stats.avg_wait_time, stats.avg_num_in_system));
    }
}

#[test]
fn throughput_bounded_and_converges_with_capacity() {
    let lambda = 1.5;
    let mut last_gap = f64::INFINITY;
    for capacity in [10, 20, 50, 100, 200] {
        let mut model = BirthDeathModel::new(capacity, reference_profile()).unwrap();
        model.solve(lambda, 1);
        let stats = model.stats().unwrap();
        assert!(stats.throughput <= lambda);
        let gap = lambda - stats.throughput;
        assert!(gap < last_gap);
        last_gap = gap;
    }
    assert!(last_gap < 1e-6);
}

#[test]
fn analyzer_matches_raw_model() {
    let analyzer = reference_analyzer();
    let metrics = analyzer.analyze(1000.0).unwrap();

    let mut model = BirthDeathModel::new(100, reference_profile()).unwrap();
    model.solve(1.0, 1);
    let stats = model.stats().unwrap();

    assert!((metrics.throughput - stats.throughput * 1000.0).abs() < 1e-6);
    assert!((metrics.avg_wait_time - stats.avg_wait_time).abs() < 1e-9);
    assert!((metrics.avg_num_in_serv - stats.avg_num_in_service).abs() < 1e-9);
}

#[test]
fn concurrent_sizing_is_independent() {
    let loose = reference_analyzer();
    let demo = QueueAnalyzer::new(QueueConfig::default(), RequestSize::default()).unwrap();
    let targets = TargetPerf {
        itl: Some(14.0),
        ..TargetPerf::default()
    };

    let expected_loose = loose.size(&targets).unwrap().rate;
    let expected_demo = demo.size(&targets).unwrap().rate;

    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let analyzer = if i % 2 == 0 { &loose } else { &demo };
                s.spawn(move || analyzer.size(&targets).unwrap().rate)
            })
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            let rate = handle.join().unwrap();
            let expected = if i % 2 == 0 { expected_loose } else { expected_demo };
            assert_eq!(rate, expected);
        }
    });
}
