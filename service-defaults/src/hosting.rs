use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Instant;

use axum::body::Body;
use axum::extract::connect_info::Connected;
use axum::extract::MatchedPath;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::serve::IncomingStream;
use opentelemetry::metrics::{Counter, Histogram, UpDownCounter};
use opentelemetry::{global, KeyValue};
use tower_http::trace::MakeSpan;
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::propagation::extract_context;
use crate::telemetry::{HOSTING_METER, SERVER_CONNECTIONS_METER};

struct HostingInstruments {
    request_duration: Histogram<f64>,
    active_requests: UpDownCounter<i64>,
    connections: Counter<u64>,
}

fn instruments() -> &'static HostingInstruments {
    static INSTRUMENTS: OnceLock<HostingInstruments> = OnceLock::new();
    INSTRUMENTS.get_or_init(|| {
        let hosting = global::meter(HOSTING_METER);
        let connections = global::meter(SERVER_CONNECTIONS_METER);
        HostingInstruments {
            request_duration: hosting
                .f64_histogram("http.server.request.duration")
                .with_unit("s")
                .with_description("Duration of inbound HTTP requests")
                .build(),
            active_requests: hosting
                .i64_up_down_counter("http.server.active_requests")
                .with_description("Inbound HTTP requests in flight")
                .build(),
            connections: connections
                .u64_counter("http.server.connections")
                .with_description("Connections accepted by the server")
                .build(),
        }
    })
}

/// Middleware to record the hosting metrics of every request.
pub async fn track_requests(req: Request<Body>, next: Next) -> impl IntoResponse {
    let start = Instant::now();

    let route = if let Some(matched_path) = req.extensions().get::<MatchedPath>() {
        matched_path.as_str().to_owned()
    } else {
        req.uri().path().to_owned()
    };

    let method = KeyValue::new("http.request.method", req.method().to_string());
    let instruments = instruments();

    let in_flight = InFlight::enter(|delta| {
        instruments.active_requests.add(delta, &[method.clone()]);
    });
    // Run the rest of the request handling first, so we can measure it and get response
    // codes.
    let response = next.run(req).await;
    drop(in_flight);

    let attributes = [
        method,
        KeyValue::new("http.route", route),
        KeyValue::new(
            "http.response.status_code",
            i64::from(response.status().as_u16()),
        ),
    ];
    instruments
        .request_duration
        .record(start.elapsed().as_secs_f64(), &attributes);

    response
}

/// Counts one unit in flight until dropped, so cancelled requests are
/// released too.
struct InFlight<F: Fn(i64)> {
    track: F,
}

impl<F: Fn(i64)> InFlight<F> {
    fn enter(track: F) -> Self {
        track(1);
        Self { track }
    }
}

impl<F: Fn(i64)> Drop for InFlight<F> {
    fn drop(&mut self) {
        (self.track)(-1);
    }
}

/// Server span for inbound requests, at INFO so the default filter keeps it.
/// Continues the trace of the caller when the request carries a valid
/// `traceparent`.
#[derive(Clone, Copy, Debug, Default)]
pub struct InboundSpan;

impl<B> MakeSpan<B> for InboundSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let route = request
            .extensions()
            .get::<MatchedPath>()
            .map_or_else(|| request.uri().path(), MatchedPath::as_str);

        let span = tracing::info_span!(
            target: "tower_http::trace::make_span",
            "request",
            otel.name = %format!("{} {}", request.method(), route),
            otel.kind = "server",
            http.request.method = %request.method(),
            http.route = route,
            url.path = request.uri().path(),
        );

        if let Some(parent) = extract_context(request.headers()) {
            span.set_parent(parent);
        }
        span
    }
}

/// Peer address of a connection. Counts accepted connections as the server
/// extracts it.
#[derive(Clone, Copy, Debug)]
pub struct ClientAddr(pub SocketAddr);

impl Connected<IncomingStream<'_>> for ClientAddr {
    fn connect_info(target: IncomingStream<'_>) -> Self {
        instruments().connections.add(1, &[]);
        ClientAddr(target.remote_addr())
    }
}
