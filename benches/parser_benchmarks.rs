use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hostpulse::{
    metrics::parser::parse_powermetrics, AlertEngine, AlertRule, CollectorData, MetricsSnapshot,
    Operator, SensorParser,
};
use std::collections::BTreeMap;

const APPLE_SILICON: &str = "\
**** Thermal pressure ****

Current pressure level: Nominal

**** CPU usage ****

CPU Power: 291 mW
GPU Power: 12 mW
ANE Power: 0 mW
Combined Power (CPU + GPU + ANE): 303 mW
";

const INTEL_SMC: &str = "\
**** SMC sensors ****

Fan: 1797.11 rpm
CPU die temperature: 52.31 C
GPU die temperature: 48.00 C
Intel energy model derived package power (CPUs+GT+SA): 3.21W
";

const LM_SENSORS: &str = "\
coretemp-isa-0000
Adapter: ISA adapter
Package id 0:  +45.0°C  (high = +80.0°C, crit = +100.0°C)
Core 0:        +43.0°C  (high = +80.0°C, crit = +100.0°C)
Core 1:        +44.0°C  (high = +80.0°C, crit = +100.0°C)
fan1:        1200 RPM
";

/// Benchmark sensor text parsing across report formats
fn bench_sensor_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("sensor_parsing");
    for (name, text) in [("apple_silicon", APPLE_SILICON), ("intel_smc", INTEL_SMC)] {
        group.bench_with_input(BenchmarkId::new("powermetrics", name), text, |b, text| {
            b.iter(|| parse_powermetrics(black_box(text)))
        });
    }

    let lm_sensors = SensorParser::lm_sensors();
    group.bench_function("lm_sensors", |b| b.iter(|| lm_sensors.parse(black_box(LM_SENSORS))));

    let large = APPLE_SILICON.repeat(50);
    group.bench_function("powermetrics_large", |b| b.iter(|| parse_powermetrics(black_box(&large))));
    group.finish();
}

fn sensor_map(prefix: &str, count: usize) -> BTreeMap<String, f64> {
    (0..count).map(|i| (format!("{}_{}", prefix, i), 40.0 + i as f64)).collect()
}

/// Benchmark merging collector output into a snapshot
fn bench_merge(c: &mut Criterion) {
    let host = CollectorData {
        cpu_percent: Some(37.5),
        memory_percent: Some(61.0),
        disk_percent: Some(72.0),
        ..Default::default()
    };
    let thermal = CollectorData {
        temperatures: Some(sensor_map("temp", 16)),
        sensors_available: Some(true),
        ..Default::default()
    };
    let external = CollectorData {
        temperatures_extra: Some(sensor_map("temp", 24)),
        ..Default::default()
    };

    c.bench_function("merge_into_snapshot", |b| {
        b.iter(|| {
            let mut merged = CollectorData::default();
            merged.merge(host.clone());
            merged.merge(thermal.clone());
            merged.merge(external.clone());
            merged.into_snapshot()
        })
    });
}

/// Benchmark alert evaluation over a realistic rule set
fn bench_alert_evaluation(c: &mut Criterion) {
    let rules = [
        AlertRule::new("cpu", "CPU", "cpu_percent", Operator::Gte, 90.0),
        AlertRule::new("mem", "Memory", "memory_percent", Operator::Gte, 90.0),
        AlertRule::new("disk", "Disk", "disk_percent", Operator::Gte, 95.0),
        AlertRule::new("battery", "Battery", "battery_percent", Operator::Lte, 10.0),
        AlertRule::new("thermal", "Thermal", "thermal_pressure", Operator::Gte, 3.0),
    ];
    let snapshot = MetricsSnapshot {
        cpu_percent: 95.0,
        memory_percent: 40.0,
        ..Default::default()
    };
    let mut engine = AlertEngine::with_rules(rules);
    let mut now = 0.0;

    c.bench_function("alert_evaluation", |b| {
        b.iter(|| {
            now += 1.0;
            engine.evaluate_at(black_box(&snapshot), now)
        })
    });
}

criterion_group!(benches, bench_sensor_parsing, bench_merge, bench_alert_evaluation);
criterion_main!(benches);
