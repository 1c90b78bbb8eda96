//! HTTP API: configuration, routing, authentication middleware and the
//! request/response envelopes.

pub mod app;
pub mod authz;
pub mod config;
pub mod context;
pub mod middleware;
pub mod oauth;
