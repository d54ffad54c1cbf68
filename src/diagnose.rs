//! Health reports for service dependencies.
//!
//! Each [`Component`] produces a [`ComponentReport`]; a [`HealthChecker`]
//! runs all of them concurrently and folds the results into a
//! [`HealthReport`] whose status is `ERROR` as soon as one component fails.

use std::fmt;
use std::time::{Duration, Instant};

use futures::future::{join_all, BoxFuture};

#[cfg(feature = "json")]
use serde::{Serialize, Serializer};

/// Outcome of a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "json", derive(Serialize))]
pub enum HealthStatus {
    /// Healthy.
    #[default]
    #[cfg_attr(feature = "json", serde(rename = "OK"))]
    Ok,
    /// Failing.
    #[cfg_attr(feature = "json", serde(rename = "ERROR"))]
    Error,
}

impl HealthStatus {
    /// `"OK"` or `"ERROR"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of checking one component.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "json", derive(Serialize))]
pub struct ComponentReport {
    /// Overall status of the component.
    pub status: HealthStatus,
    /// Component name, e.g. `"redis"`.
    pub name: String,
    /// `"ok"`, or what failed.
    pub message: String,
    /// What to look at when the check fails.
    pub suggestion: String,
    /// Slowest probe observed.
    #[cfg_attr(feature = "json", serde(serialize_with = "serialize_latency"))]
    pub latency: Duration,
}

impl ComponentReport {
    /// A passing report for `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Ok,
            name: name.into(),
            message: "ok".to_string(),
            suggestion: String::new(),
            latency: Duration::ZERO,
        }
    }

    /// Marks the report as failed when `result` is an error.
    ///
    /// The message becomes `<message>: "<error>"`; a later failure replaces
    /// an earlier one.
    pub fn check<T, E: fmt::Display>(
        &mut self,
        result: &Result<T, E>,
        message: &str,
        suggestion: &str,
    ) {
        if let Err(e) = result {
            self.status = HealthStatus::Error;
            self.message = format!("{}: \"{}\"", message, e);
            self.suggestion = suggestion.to_string();
        }
    }

    /// Records the time since `start`, keeping the largest value seen.
    pub fn add_latency(&mut self, start: Instant) {
        self.record_latency(start.elapsed());
    }

    fn record_latency(&mut self, latency: Duration) {
        self.latency = self.latency.max(latency);
    }
}

/// Aggregated report of every component.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "json", derive(Serialize))]
pub struct HealthReport {
    /// `ERROR` if any component failed.
    pub status: HealthStatus,
    /// Per-component reports in registration order.
    pub details: Vec<ComponentReport>,
}

impl HealthReport {
    /// Appends a component report, downgrading the overall status if needed.
    pub fn add(&mut self, report: ComponentReport) {
        if report.status == HealthStatus::Error {
            self.status = HealthStatus::Error;
        }
        self.details.push(report);
    }

    /// Serializes the report, latencies in Go duration notation.
    #[cfg(feature = "json")]
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Something whose health can be probed.
pub trait Component: Send + Sync {
    /// Probes the component.
    fn diagnose(&self) -> BoxFuture<'_, ComponentReport>;
}

/// Runs registered components and collects their reports.
#[derive(Default)]
pub struct HealthChecker {
    components: Vec<Box<dyn Component>>,
}

impl fmt::Debug for HealthChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthChecker")
            .field("components", &self.components.len())
            .finish()
    }
}

impl HealthChecker {
    /// An empty checker; its report is `OK`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a component.
    pub fn add(&mut self, component: impl Component + 'static) -> &mut Self {
        self.components.push(Box::new(component));
        self
    }

    /// Diagnoses every component concurrently.
    pub async fn check(&self) -> HealthReport {
        let reports = join_all(self.components.iter().map(|c| c.diagnose())).await;
        let mut health = HealthReport::default();
        for report in reports {
            health.add(report);
        }
        health
    }
}

#[cfg(feature = "json")]
fn serialize_latency<S: Serializer>(latency: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_duration(*latency))
}

/// Formats like Go's `time.Duration.String`: `"0s"`, `"250ns"`, `"1.5µs"`,
/// `"100ms"`, `"1.5s"`, `"2m0s"`, `"1h0m0s"`.
pub fn format_duration(d: Duration) -> String {
    const MICRO: u128 = 1_000;
    const MILLI: u128 = 1_000_000;
    const SECOND: u128 = 1_000_000_000;
    const MINUTE: u128 = 60 * SECOND;
    const HOUR: u128 = 60 * MINUTE;

    let nanos = d.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    if nanos < MICRO {
        return format!("{nanos}ns");
    }
    if nanos < MILLI {
        return format!("{}µs", decimal(nanos, MICRO));
    }
    if nanos < SECOND {
        return format!("{}ms", decimal(nanos, MILLI));
    }

    let hours = nanos / HOUR;
    let minutes = nanos % HOUR / MINUTE;
    let seconds = decimal(nanos % MINUTE, SECOND);
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// `value / unit` with the fraction's trailing zeros removed.
fn decimal(value: u128, unit: u128) -> String {
    let whole = value / unit;
    let frac = value % unit;
    if frac == 0 {
        return whole.to_string();
    }
    let width = unit.to_string().len() - 1;
    let frac = format!("{frac:0width$}");
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}
