use std::future::ready;

use axum::routing::get;
use health::LIVE_TAG;

use crate::application::WebApplication;

pub const HEALTH_PATH: &str = "/health";
pub const ALIVE_PATH: &str = "/alive";

impl WebApplication {
    /// Maps the readiness probe to `/health`, evaluating every registered
    /// check, and the liveness probe to `/alive`, evaluating the checks tagged
    /// `live`. Both answer 200 when healthy and 503 otherwise.
    /// Mapping them again is a no-op.
    pub fn map_default_health_check_endpoints(mut self) -> Self {
        if self.health_endpoints_mapped {
            return self;
        }
        self.health_endpoints_mapped = true;

        let readiness = self.health_checks().clone();
        let liveness = readiness.clone();

        self.route(
            HEALTH_PATH,
            get(move || ready(readiness.check_all("readiness"))),
        )
        .route(
            ALIVE_PATH,
            get(move || {
                ready(liveness.check_health("liveness", |registration| {
                    registration.has_tag(LIVE_TAG)
                }))
            }),
        )
    }
}
