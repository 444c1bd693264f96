//! Maintaining and outputting metrics.
//!
//! Relevant sources for selecting metrics, metric names, and labels:
//! - https://prometheus.io/docs/practices/naming/
//! - https://prometheus.io/docs/instrumenting/writing_exporters/#labels
//! - https://prometheus.io/docs/practices/instrumentation/
//! - https://github.com/prometheus/OpenMetrics/blob/main/specification/OpenMetrics.md

use std::fmt;

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelValue;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::info::Info;
use prometheus_client::registry::{Metric, Registry};

//------------ Module Configuration ------------------------------------------

/// The application prefix to use in the names of Prometheus metrics.
const PROMETHEUS_PREFIX: &str = "gmsa_authd";

//------------ PacErrorKindLabel ----------------------------------------------

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum PacErrorKindLabel {
    InvalidFormat,
    MissingSignature,
    SignatureInvalid,
    ClockSkew,
    UpnInconsistent,
}

impl From<&crate::error::PacErrorKind> for PacErrorKindLabel {
    fn from(kind: &crate::error::PacErrorKind) -> Self {
        use crate::error::PacErrorKind as K;
        match kind {
            K::InvalidFormat => Self::InvalidFormat,
            K::MissingSignature => Self::MissingSignature,
            K::SignatureInvalid => Self::SignatureInvalid,
            K::ClockSkew => Self::ClockSkew,
            K::UpnInconsistent => Self::UpnInconsistent,
        }
    }
}

//------------ Counters --------------------------------------------------

/// The login/authorization counters tracked on every request.
#[derive(Debug, Default)]
pub struct Counters {
    logins_total: Counter,
    logins_denied_total: Counter,
    pac_errors_total: Family<PacErrorKindLabel, Counter>,
    requests_abandoned_total: Counter,
    rotations_total: Counter,
}

impl Counters {
    pub fn register_metrics(&self, reg: &mut Registry) {
        reg.register("logins_total", "Number of successful logins", self.logins_total.clone());
        reg.register(
            "logins_denied_total",
            "Number of logins denied by authorization",
            self.logins_denied_total.clone(),
        );
        reg.register(
            "pac_errors_total",
            "Number of PAC verification failures, by kind",
            self.pac_errors_total.clone(),
        );
        reg.register(
            "requests_abandoned_total",
            "Number of login requests abandoned after the deadline",
            self.requests_abandoned_total.clone(),
        );
        reg.register(
            "rotations_total",
            "Number of successful keytab rotations",
            self.rotations_total.clone(),
        );
    }

    pub fn record_login_success(&self) {
        self.logins_total.inc();
    }

    pub fn record_login_denied(&self) {
        self.logins_denied_total.inc();
    }

    pub fn record_pac_error(&self, kind: &crate::error::PacErrorKind) {
        self.pac_errors_total.get_or_create(&PacErrorKindLabel::from(kind)).inc();
    }

    pub fn record_request_abandoned(&self) {
        self.requests_abandoned_total.inc();
    }

    pub fn record_rotation(&self) {
        self.rotations_total.inc();
    }
}

//------------ MetricsCollection ---------------------------------------------

#[derive(Debug)]
pub struct MetricsCollection {
    /// The metrics registry for every metric this process exposes. Units
    /// register their metrics with this registry.
    pub registry: Registry,

    counters: Counters,
}

impl MetricsCollection {
    pub fn new() -> Self {
        let mut col = Self {
            registry: Registry::with_prefix(PROMETHEUS_PREFIX),
            counters: Counters::default(),
        };

        let build_info = Info::new(vec![("version", clap::crate_version!())]);
        col.registry.register("build", "Build information", build_info);

        col.counters.register_metrics(&mut col.registry);

        col
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Render the current metrics snapshot in OpenMetrics text format.
    pub fn assemble(&self) -> Result<String, fmt::Error> {
        String::try_from(self)
    }

    /// Register a metric with the [`Registry`].
    ///
    /// Note: In the Open Metrics text exposition format some metric types have
    /// a special suffix, e.g. the
    /// [`Counter`](crate::metrics::counter::Counter`) metric with `_total`.
    /// These suffixes are inferred through the metric type and must not be
    /// appended to the metric name manually by the user.
    ///
    /// Note: A full stop punctuation mark (`.`) is automatically added to the
    /// passed help text.
    pub fn register<N: Into<String>, H: Into<String>>(&mut self, name: N, help: H, metric: impl Metric) {
        self.registry.register(name, help, metric)
    }
}

impl TryFrom<&MetricsCollection> for String {
    type Error = fmt::Error;

    fn try_from(metrics: &MetricsCollection) -> Result<Self, Self::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &metrics.registry)?;
        Ok(buffer)
    }
}

impl Default for MetricsCollection {
    fn default() -> Self {
        Self::new()
    }
}
