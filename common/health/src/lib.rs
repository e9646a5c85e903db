//! Health checks for the components of a service.
//!
//! A service declares a set of named checks at startup, each carrying a set of
//! tags. Probes evaluate a subset of them, selected by a predicate over the
//! tags, and the probe is healthy only if every selected check is:
//!   - a check is a plain function returning a `HealthCheckResult`, or
//!   - a component check, backed by a `HealthHandle` the component reports
//!     through. If the component failed to report healthy before its
//!     deadline, it is considered stalled and the check fails.
//!
//! Liveness and readiness are expressed through tags rather than separate
//! registries: the liveness probe selects the checks tagged `live`, the
//! readiness probe selects all of them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Add;
use std::sync::{Arc, RwLock};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};

pub const LIVE_TAG: &str = "live";

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct HealthCheckResult {
    pub healthy: bool,
    /// Free-form reason, shown in the logs when the check fails
    pub description: Option<String>,
}

impl HealthCheckResult {
    pub fn healthy() -> Self {
        Self {
            healthy: true,
            description: None,
        }
    }

    pub fn unhealthy(description: impl Into<String>) -> Self {
        Self {
            healthy: false,
            description: Some(description.into()),
        }
    }
}

type CheckFn = Arc<dyn Fn() -> HealthCheckResult + Send + Sync>;

#[derive(Clone)]
pub struct HealthCheckRegistration {
    name: String,
    tags: BTreeSet<String>,
    check: CheckFn,
}

impl HealthCheckRegistration {
    pub fn new<F, T, I>(name: &str, tags: I, check: F) -> Self
    where
        F: Fn() -> HealthCheckResult + Send + Sync + 'static,
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            name: name.to_owned(),
            tags: tags.into_iter().map(Into::into).collect(),
            check: Arc::new(check),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn evaluate(&self) -> HealthCheckResult {
        (self.check)()
    }
}

impl fmt::Debug for HealthCheckRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthCheckRegistration")
            .field("name", &self.name)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ComponentStatus {
    /// Automatically set when a component is newly registered
    Starting,
    /// Recently reported healthy, will need to report again before the date
    HealthyUntil(OffsetDateTime),
    /// Reported unhealthy
    Unhealthy,
    /// Automatically set when the HealthyUntil deadline is reached
    Stalled,
}

impl ComponentStatus {
    /// Returns true if the component is currently healthy (i.e., has a valid HealthyUntil status)
    pub fn is_healthy(&self) -> bool {
        match self {
            ComponentStatus::HealthyUntil(until) => until.gt(&OffsetDateTime::now_utc()),
            _ => false,
        }
    }
}

#[derive(Clone)]
pub struct HealthHandle {
    component: String,
    deadline: Duration,
    status: Arc<RwLock<ComponentStatus>>,
}

impl HealthHandle {
    /// Report healthy until now + deadline.
    /// Must be called more frequently than the configured deadline.
    pub fn report_healthy(&self) {
        self.report_status(ComponentStatus::HealthyUntil(
            OffsetDateTime::now_utc().add(self.deadline),
        ))
    }

    pub fn report_status(&self, status: ComponentStatus) {
        match self.status.write() {
            Ok(mut current) => *current = status,
            // Poisoned lock: the check keeps failing and the process gets restarted
            Err(_) => warn!("poisoned health status lock for {}", self.component),
        }
    }

    /// Current status, with an expired deadline reported as `Stalled`.
    pub fn status(&self) -> ComponentStatus {
        let status = match self.status.read() {
            Ok(status) => status.clone(),
            Err(_) => return ComponentStatus::Unhealthy,
        };
        if matches!(status, ComponentStatus::HealthyUntil(_)) && !status.is_healthy() {
            ComponentStatus::Stalled
        } else {
            status
        }
    }

    fn check(&self) -> HealthCheckResult {
        match self.status() {
            status if status.is_healthy() => HealthCheckResult::healthy(),
            status => HealthCheckResult::unhealthy(format!("{}: {:?}", self.component, status)),
        }
    }
}

/// Builder-time set of health checks. Registrations are keyed by name:
/// registering a name twice replaces the first registration.
#[derive(Default, Clone, Debug)]
pub struct HealthCheckRegistry {
    registrations: Vec<HealthCheckRegistration>,
}

impl HealthCheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, registration: HealthCheckRegistration) -> &mut Self {
        match self
            .registrations
            .iter_mut()
            .find(|existing| existing.name == registration.name)
        {
            Some(existing) => *existing = registration,
            None => self.registrations.push(registration),
        }
        self
    }

    pub fn add_check<F, T, I>(&mut self, name: &str, tags: I, check: F) -> &mut Self
    where
        F: Fn() -> HealthCheckResult + Send + Sync + 'static,
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.add(HealthCheckRegistration::new(name, tags, check))
    }

    /// Registers a new component in the registry. The returned handle should be passed
    /// to the component, to allow it to frequently report its health status.
    pub fn register_component<T, I>(
        &mut self,
        component: &str,
        tags: I,
        deadline: Duration,
    ) -> HealthHandle
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let handle = HealthHandle {
            component: component.to_owned(),
            deadline,
            status: Arc::new(RwLock::new(ComponentStatus::Starting)),
        };
        let reporter = handle.clone();
        self.add_check(component, tags, move || reporter.check());
        handle
    }

    pub fn get(&self, name: &str) -> Option<&HealthCheckRegistration> {
        self.registrations.iter().find(|r| r.name == name)
    }

    pub fn registrations(&self) -> &[HealthCheckRegistration] {
        &self.registrations
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Freezes the registrations into a cheaply cloneable service for the probes.
    pub fn into_service(self) -> HealthCheckService {
        HealthCheckService {
            registrations: self.registrations.into(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct HealthCheckService {
    registrations: Arc<[HealthCheckRegistration]>,
}

impl HealthCheckService {
    pub fn registrations(&self) -> &[HealthCheckRegistration] {
        &self.registrations
    }

    pub fn check_all(&self, probe: &str) -> HealthReport {
        self.check_health(probe, |_| true)
    }

    /// Evaluates every registration selected by the predicate. The report is
    /// healthy if all selected checks are, including when none is selected.
    pub fn check_health<P>(&self, probe: &str, predicate: P) -> HealthReport
    where
        P: Fn(&HealthCheckRegistration) -> bool,
    {
        let report = self
            .registrations
            .iter()
            .filter(|registration| predicate(registration))
            .fold(HealthReport::healthy(), |mut report, registration| {
                let result = registration.evaluate();
                report.healthy &= result.healthy;
                report.entries.insert(registration.name.clone(), result);
                report
            });

        match report.healthy {
            true => info!("{} health check ok", probe),
            false => warn!("{} health check failed: {:?}", probe, report.failures()),
        }
        report
    }
}

#[derive(Debug)]
pub struct HealthReport {
    /// The overall status: true if all evaluated checks are healthy
    pub healthy: bool,
    /// Result of each evaluated check, for display
    pub entries: BTreeMap<String, HealthCheckResult>,
}

impl HealthReport {
    fn healthy() -> Self {
        Self {
            healthy: true,
            entries: BTreeMap::new(),
        }
    }

    pub fn failures(&self) -> Vec<(&str, Option<&str>)> {
        self.entries
            .iter()
            .filter(|(_, result)| !result.healthy)
            .map(|(name, result)| (name.as_str(), result.description.as_deref()))
            .collect()
    }
}

impl IntoResponse for HealthReport {
    /// 200 when healthy, 503 otherwise, with the aggregate status as body.
    fn into_response(self) -> Response {
        match self.healthy {
            true => (StatusCode::OK, "Healthy"),
            false => (StatusCode::SERVICE_UNAVAILABLE, "Unhealthy"),
        }
        .into_response()
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        ComponentStatus, HealthCheckRegistry, HealthCheckResult, HealthReport, LIVE_TAG,
    };
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use std::ops::Sub;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use time::{Duration, OffsetDateTime};

    #[test]
    fn empty_registry_is_healthy() {
        let service = HealthCheckRegistry::new().into_service();
        assert!(service.check_all("readiness").healthy);
    }

    #[test]
    fn same_name_replaces_registration() {
        let mut registry = HealthCheckRegistry::new();
        registry.add_check("self", [LIVE_TAG], || HealthCheckResult::unhealthy("down"));
        registry.add_check("self", [LIVE_TAG], HealthCheckResult::healthy);

        assert_eq!(registry.len(), 1);
        assert!(registry.into_service().check_all("readiness").healthy);
    }

    #[test]
    fn predicate_selects_checks_by_tag() {
        let db_up = Arc::new(AtomicBool::new(true));
        let mut registry = HealthCheckRegistry::new();
        registry.add_check("self", [LIVE_TAG], HealthCheckResult::healthy);
        let flag = db_up.clone();
        registry.add_check("database", ["ready"], move || {
            match flag.load(Ordering::SeqCst) {
                true => HealthCheckResult::healthy(),
                false => HealthCheckResult::unhealthy("connection refused"),
            }
        });
        let service = registry.into_service();
        let liveness = |r: &crate::HealthCheckRegistration| r.has_tag(LIVE_TAG);

        assert!(service.check_all("readiness").healthy);
        assert!(service.check_health("liveness", liveness).healthy);

        // The untagged dependency takes readiness down, not liveness
        db_up.store(false, Ordering::SeqCst);
        let readiness = service.check_all("readiness");
        assert!(!readiness.healthy);
        assert_eq!(readiness.failures(), vec![("database", Some("connection refused"))]);

        let alive = service.check_health("liveness", liveness);
        assert!(alive.healthy);
        assert_eq!(alive.entries.len(), 1);
    }

    #[test]
    fn one_component() {
        let mut registry = HealthCheckRegistry::new();

        // New components are registered in Starting
        let handle = registry.register_component("one", [LIVE_TAG], Duration::seconds(30));
        assert_eq!(handle.status(), ComponentStatus::Starting);
        let service = registry.into_service();
        assert!(!service.check_all("liveness").healthy);

        // Status goes healthy once the component reports
        handle.report_healthy();
        assert!(service.check_all("liveness").healthy);

        // Status goes unhealthy if the components says so
        handle.report_status(ComponentStatus::Unhealthy);
        let report = service.check_all("liveness");
        assert!(!report.healthy);
        assert_eq!(report.entries.len(), 1);
        assert_eq!(handle.status(), ComponentStatus::Unhealthy);
    }

    #[test]
    fn staleness_check() {
        let mut registry = HealthCheckRegistry::new();
        let handle = registry.register_component("one", [LIVE_TAG], Duration::seconds(30));
        let service = registry.into_service();

        handle.report_healthy();
        assert!(service.check_all("liveness").healthy);

        // If the component's ping is too old, it is considered stalled and the healthcheck fails
        handle.report_status(ComponentStatus::HealthyUntil(
            OffsetDateTime::now_utc().sub(Duration::seconds(1)),
        ));
        assert!(!service.check_all("liveness").healthy);
        assert_eq!(handle.status(), ComponentStatus::Stalled);
    }

    #[test]
    fn several_components() {
        let mut registry = HealthCheckRegistry::new();
        let handle1 = registry.register_component("one", [LIVE_TAG], Duration::seconds(30));
        let handle2 = registry.register_component("two", [LIVE_TAG], Duration::seconds(30));
        let service = registry.into_service();

        // First component going healthy is not enough
        handle1.report_healthy();
        assert!(!service.check_all("liveness").healthy);

        // Second component going healthy brings the health to green
        handle2.report_healthy();
        assert!(service.check_all("liveness").healthy);

        // First component going unhealthy takes down the health to red
        handle1.report_status(ComponentStatus::Unhealthy);
        assert!(!service.check_all("liveness").healthy);

        // First component recovering returns the health to green
        handle1.report_healthy();
        assert!(service.check_all("liveness").healthy);
    }

    #[test]
    fn into_response() {
        let nok = HealthReport {
            healthy: false,
            entries: Default::default(),
        }
        .into_response();
        assert_eq!(nok.status(), StatusCode::SERVICE_UNAVAILABLE);

        let ok = HealthReport {
            healthy: true,
            entries: Default::default(),
        }
        .into_response();
        assert_eq!(ok.status(), StatusCode::OK);
    }
}
