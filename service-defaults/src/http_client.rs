//! Outbound HTTP clients with resilience and service discovery applied.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use opentelemetry::metrics::{Counter, Histogram};
use opentelemetry::{global, KeyValue};
use reqwest::{Method, StatusCode};
use time::format_description::well_known::Rfc2822;
use time::OffsetDateTime;
use tracing::{debug, warn};
use tracing_opentelemetry::OpenTelemetrySpanExt;
use url::Url;

use crate::discovery::ServiceEndpointResolver;
use crate::error::HttpClientError;
use crate::propagation::inject_context;
use crate::telemetry::HTTP_CLIENT_METER;

const USER_AGENT_PREFIX: &str = "service-defaults";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
/// How many times a request is retried and how long to wait in between.
pub struct RetryPolicy {
    /// Retries after the first attempt, so a request is sent at most this plus one times.
    pub max_retry_attempts: u32,
    /// Coefficient to multiply initial_interval with for every past attempt.
    pub backoff_coefficient: u32,
    /// The backoff interval for the first retry.
    pub initial_interval: Duration,
    /// The maximum possible backoff between retries.
    pub maximum_interval: Option<Duration>,
}

impl RetryPolicy {
    pub fn new(
        max_retry_attempts: u32,
        backoff_coefficient: u32,
        initial_interval: Duration,
        maximum_interval: Option<Duration>,
    ) -> Self {
        Self {
            max_retry_attempts,
            backoff_coefficient,
            initial_interval,
            maximum_interval,
        }
    }

    /// Calculate the time until the next retry, given the number of past
    /// retries and the interval the server asked for, if any.
    pub fn time_until_next_retry(
        &self,
        attempt: u32,
        preferred_retry_interval: Option<Duration>,
    ) -> Duration {
        let candidate_interval = self
            .backoff_coefficient
            .checked_pow(attempt)
            .and_then(|factor| self.initial_interval.checked_mul(factor))
            .unwrap_or(Duration::MAX);

        match (preferred_retry_interval, self.maximum_interval) {
            (Some(duration), Some(max_interval)) => std::cmp::min(
                std::cmp::max(std::cmp::min(candidate_interval, max_interval), duration),
                max_interval,
            ),
            (Some(duration), None) => std::cmp::max(candidate_interval, duration),
            (None, Some(max_interval)) => std::cmp::min(candidate_interval, max_interval),
            (None, None) => candidate_interval,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retry_attempts: 3,
            backoff_coefficient: 2,
            initial_interval: Duration::from_secs(2),
            maximum_interval: Some(Duration::from_secs(30)),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ResiliencePolicy {
    /// Budget for the whole request, retries and waits included
    pub total_timeout: Duration,
    pub attempt_timeout: Duration,
    pub retry: RetryPolicy,
}

impl ResiliencePolicy {
    pub fn standard() -> Self {
        Self {
            total_timeout: Duration::from_secs(30),
            attempt_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

impl Default for ResiliencePolicy {
    fn default() -> Self {
        Self::standard()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HttpClientDefaults {
    /// `None` sends every request once, with no timeout of our own
    pub resilience: Option<ResiliencePolicy>,
    pub use_service_discovery: bool,
}

impl HttpClientDefaults {
    /// The standard resilience policy with service discovery.
    pub fn standard() -> Self {
        Self {
            resilience: Some(ResiliencePolicy::standard()),
            use_service_discovery: true,
        }
    }
}

/// Creates named clients sharing the host's defaults.
#[derive(Clone, Debug)]
pub struct HttpClientFactory {
    defaults: HttpClientDefaults,
    resolver: Option<ServiceEndpointResolver>,
}

impl HttpClientFactory {
    pub fn new(defaults: HttpClientDefaults, resolver: Option<ServiceEndpointResolver>) -> Self {
        Self { defaults, resolver }
    }

    pub fn defaults(&self) -> &HttpClientDefaults {
        &self.defaults
    }

    pub fn create_client(&self, name: &str) -> Result<ServiceClient, HttpClientError> {
        let mut builder =
            reqwest::Client::builder().user_agent(format!("{USER_AGENT_PREFIX}/{name}"));
        if let Some(policy) = &self.defaults.resilience {
            builder = builder.timeout(policy.attempt_timeout);
        }

        let resolver = match self.defaults.use_service_discovery {
            true => self.resolver.clone(),
            false => None,
        };

        Ok(ServiceClient {
            name: name.to_owned(),
            client: builder.build()?,
            resilience: self.defaults.resilience,
            resolver,
        })
    }
}

#[derive(Clone, Debug)]
pub struct ServiceClient {
    name: String,
    client: reqwest::Client,
    resilience: Option<ResiliencePolicy>,
    resolver: Option<ServiceEndpointResolver>,
}

impl ServiceClient {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying client, without resilience or discovery.
    pub fn inner(&self) -> &reqwest::Client {
        &self.client
    }

    /// Parses the URL and resolves its host through service discovery.
    pub fn resolve(&self, url: &str) -> Result<Url, HttpClientError> {
        let url = Url::parse(url)?;
        match &self.resolver {
            Some(resolver) => resolver.resolve(&url),
            None => Ok(url),
        }
    }

    pub fn request(
        &self,
        method: Method,
        url: &str,
    ) -> Result<reqwest::RequestBuilder, HttpClientError> {
        Ok(self.client.request(method, self.resolve(url)?))
    }

    pub async fn get(&self, url: &str) -> Result<reqwest::Response, HttpClientError> {
        self.send(self.request(Method::GET, url)?).await
    }

    pub async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, HttpClientError> {
        self.execute(request.build()?).await
    }

    /// Sends the request, retrying transport errors, attempt timeouts and
    /// retryable statuses until the policy gives up. Once it does, the last
    /// response or error is returned as is. Requests whose body cannot be
    /// cloned are sent once.
    #[tracing::instrument(
        name = "http_client.request",
        skip_all,
        fields(client = %self.name, method = %request.method(), url = %request.url())
    )]
    pub async fn execute(
        &self,
        request: reqwest::Request,
    ) -> Result<reqwest::Response, HttpClientError> {
        let Some(policy) = self.resilience else {
            return self.attempt(request, None).await;
        };

        // None when the total timeout is too large to represent, i.e. unbounded
        let deadline = Instant::now().checked_add(policy.total_timeout);
        let mut request = request;
        let mut attempt = 0;

        loop {
            let next = request.try_clone();
            let method = request.method().clone();
            let remaining = deadline.map_or(Duration::MAX, |deadline| {
                deadline.saturating_duration_since(Instant::now())
            });
            let attempt_timeout = policy.attempt_timeout.min(remaining);
            let outcome = self.attempt(request, Some(attempt_timeout)).await;

            let Some(next) = next else {
                return outcome;
            };
            let retry_after = match &outcome {
                Ok(response) if is_retryable_status(response.status()) => {
                    parse_retry_after_header(response.headers())
                }
                Ok(_) => return outcome,
                Err(HttpClientError::Request(_) | HttpClientError::Timeout(_)) => None,
                Err(_) => return outcome,
            };

            if attempt >= policy.retry.max_retry_attempts {
                debug!(attempts = attempt + 1, "retries exhausted");
                return outcome;
            }
            let interval = policy.retry.time_until_next_retry(attempt, retry_after);
            let retry_at = Instant::now().checked_add(interval);
            let past_deadline = match (retry_at, deadline) {
                (Some(retry_at), Some(deadline)) => retry_at >= deadline,
                (Some(_), None) => false,
                (None, _) => true,
            };
            if past_deadline {
                debug!(attempts = attempt + 1, "total timeout reached");
                return outcome;
            }

            match &outcome {
                Ok(response) => warn!(status = %response.status(), ?interval, "retrying request"),
                Err(error) => warn!(%error, ?interval, "retrying request"),
            }
            instruments()
                .retries
                .add(1, &[KeyValue::new("http.request.method", method.to_string())]);

            tokio::time::sleep(interval).await;
            request = next;
            attempt += 1;
        }
    }

    async fn attempt(
        &self,
        mut request: reqwest::Request,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, HttpClientError> {
        inject_context(&tracing::Span::current().context(), request.headers_mut());

        let start = Instant::now();
        let mut attributes = vec![
            KeyValue::new("http.request.method", request.method().to_string()),
            KeyValue::new(
                "server.address",
                request.url().host_str().unwrap_or_default().to_owned(),
            ),
        ];

        let sent = self.client.execute(request);
        let outcome = match timeout {
            Some(timeout) => tokio::time::timeout(timeout, sent)
                .await
                .map_err(|_| HttpClientError::Timeout(timeout))
                .and_then(|result| result.map_err(HttpClientError::from)),
            None => sent.await.map_err(HttpClientError::from),
        };

        match &outcome {
            Ok(response) => attributes.push(KeyValue::new(
                "http.response.status_code",
                i64::from(response.status().as_u16()),
            )),
            Err(_) => attributes.push(KeyValue::new("error.type", "transport")),
        }
        instruments()
            .request_duration
            .record(start.elapsed().as_secs_f64(), &attributes);

        outcome
    }
}

struct ClientInstruments {
    request_duration: Histogram<f64>,
    retries: Counter<u64>,
}

fn instruments() -> &'static ClientInstruments {
    static INSTRUMENTS: OnceLock<ClientInstruments> = OnceLock::new();
    INSTRUMENTS.get_or_init(|| {
        let meter = global::meter(HTTP_CLIENT_METER);
        ClientInstruments {
            request_duration: meter
                .f64_histogram("http.client.request.duration")
                .with_unit("s")
                .with_description("Duration of outbound HTTP request attempts")
                .build(),
            retries: meter
                .u64_counter("http.client.retries")
                .with_description("Outbound HTTP requests retried")
                .build(),
        }
    })
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

/// Attempt to parse a Duration from a Retry-After header, returning None if not possible.
/// Retry-After header can specify a date in RFC2822 or a number of seconds; we try to parse both.
fn parse_retry_after_header(header_map: &reqwest::header::HeaderMap) -> Option<Duration> {
    let retry_after = header_map
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?;

    if let Ok(seconds) = retry_after.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let date = OffsetDateTime::parse(retry_after, &Rfc2822).ok()?;
    // Fails when the date is in the past
    (date - OffsetDateTime::now_utc()).try_into().ok()
}
