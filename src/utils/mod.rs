//! Utility modules for the request admission service.
//! This module contains common utilities used across the application.

mod error;
mod logging;
mod telemetry;

pub use logging::{
    create_request_span, init_logging, log_csrf_rejection, log_rate_limit, log_service_event,
    log_store_failure,
};

pub use telemetry::{
    install_prometheus_recorder, record_csrf_rejection, record_rate_limit_decision,
    record_store_failure,
};

pub use error::{AdmissionError, AdmissionResult};
