//! HTTP middleware: request ids, request/response logging and timing helpers

pub mod logging;
