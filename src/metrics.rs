//! Metric helpers for `wirehttp`.
//!
//! This module defines metric names and small helpers wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. Without the `metrics`
//! feature every helper compiles to a no-op.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the gauge tracking open connections.
pub const CONNECTIONS_ACTIVE: &str = "wirehttp_connections_active";
/// Name of the counter tracking responses, labelled by status class.
pub const REQUESTS_TOTAL: &str = "wirehttp_requests_total";
/// Name of the counter tracking requests rejected by the decoder.
pub const PARSE_ERRORS_TOTAL: &str = "wirehttp_parse_errors_total";
/// Name of the counter tracking connections refused by the worker pool.
pub const REJECTED_TOTAL: &str = "wirehttp_connections_rejected_total";
/// Name of the counter tracking handler panics.
pub const PANICS_TOTAL: &str = "wirehttp_handler_panics_total";

/// Label for a status code's class: `"2xx"`, `"4xx"` and so on.
#[must_use]
pub fn status_class(status: u16) -> &'static str {
    match status {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        500..=599 => "5xx",
        _ => "other",
    }
}

/// Increment the open connections gauge.
#[cfg(feature = "metrics")]
pub fn inc_connections() { gauge!(CONNECTIONS_ACTIVE).increment(1.0); }

/// Decrement the open connections gauge.
#[cfg(feature = "metrics")]
pub fn dec_connections() { gauge!(CONNECTIONS_ACTIVE).decrement(1.0); }

/// Record a response with the given status.
#[cfg(feature = "metrics")]
pub fn inc_requests(status: u16) {
    counter!(REQUESTS_TOTAL, "class" => status_class(status)).increment(1);
}

/// Record a request the decoder rejected.
#[cfg(feature = "metrics")]
pub fn inc_parse_errors(kind: &'static str) {
    counter!(PARSE_ERRORS_TOTAL, "kind" => kind).increment(1);
}

/// Record a connection the worker pool refused.
#[cfg(feature = "metrics")]
pub fn inc_rejected() { counter!(REJECTED_TOTAL).increment(1); }

/// Record a handler panic.
#[cfg(feature = "metrics")]
pub fn inc_panics() { counter!(PANICS_TOTAL).increment(1); }

#[cfg(not(feature = "metrics"))]
pub fn inc_connections() {}

#[cfg(not(feature = "metrics"))]
pub fn dec_connections() {}

#[cfg(not(feature = "metrics"))]
pub fn inc_requests(_status: u16) {}

#[cfg(not(feature = "metrics"))]
pub fn inc_parse_errors(_kind: &'static str) {}

#[cfg(not(feature = "metrics"))]
pub fn inc_rejected() {}

#[cfg(not(feature = "metrics"))]
pub fn inc_panics() {}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::status_class;

    #[rstest]
    #[case(200, "2xx")]
    #[case(201, "2xx")]
    #[case(404, "4xx")]
    #[case(500, "5xx")]
    #[case(302, "3xx")]
    #[case(99, "other")]
    fn classifies_status(#[case] status: u16, #[case] class: &str) {
        assert_eq!(status_class(status), class);
    }
}
