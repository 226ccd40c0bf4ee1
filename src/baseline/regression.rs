//! Regression severity classification: percent-change on throughput,
//! p99 latency, and memory against the severity bands in the component
//! design. Latency/memory regressions (increases) and throughput
//! regressions (decreases) use opposite signs; the worst band across the
//! three dimensions wins, with critical taking precedence per the scenario
//! in the testable properties ("critical takes precedence").

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Stable,
    Improvement,
    Minor,
    Major,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionReport {
    pub throughput_change_pct: f64,
    pub latency_change_pct: f64,
    pub memory_change_pct: f64,
    pub severity: Severity,
}

/// `change_pct` is `(current - baseline) / baseline * 100`.
fn throughput_band(change_pct: f64) -> Severity {
    if change_pct < -30.0 {
        Severity::Critical
    } else if change_pct < -20.0 {
        Severity::Major
    } else if change_pct < -10.0 {
        Severity::Minor
    } else if change_pct > 10.0 {
        Severity::Improvement
    } else {
        Severity::Stable
    }
}

fn latency_band(change_pct: f64) -> Severity {
    if change_pct > 100.0 {
        Severity::Critical
    } else if change_pct > 50.0 {
        Severity::Major
    } else if change_pct > 25.0 {
        Severity::Minor
    } else if change_pct < -10.0 {
        Severity::Improvement
    } else {
        Severity::Stable
    }
}

fn memory_band(change_pct: f64) -> Severity {
    if change_pct > 50.0 {
        Severity::Critical
    } else if change_pct > 30.0 {
        Severity::Major
    } else if change_pct > 15.0 {
        Severity::Minor
    } else if change_pct < -10.0 {
        Severity::Improvement
    } else {
        Severity::Stable
    }
}

pub fn classify(baseline_throughput: f64, current_throughput: f64, baseline_p99: f64, current_p99: f64, baseline_memory: f64, current_memory: f64) -> RegressionReport {
    let throughput_change_pct = pct_change(baseline_throughput, current_throughput);
    let latency_change_pct = pct_change(baseline_p99, current_p99);
    let memory_change_pct = pct_change(baseline_memory, current_memory);

    let severity = [
        throughput_band(throughput_change_pct),
        latency_band(latency_change_pct),
        memory_band(memory_change_pct),
    ]
    .into_iter()
    .max()
    .unwrap_or(Severity::Stable);

    RegressionReport {
        throughput_change_pct,
        latency_change_pct,
        memory_change_pct,
        severity,
    }
}

fn pct_change(baseline: f64, current: f64) -> f64 {
    if baseline.abs() < f64::EPSILON {
        return 0.0;
    }
    (current - baseline) / baseline * 100.0
}
