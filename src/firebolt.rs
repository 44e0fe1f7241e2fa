//! Firebolt REST client.
//!
//! - [`FireboltClient`]: service account login, system engine discovery, connections
//! - [`Connection`]: query execution against one (account, engine) pair
//! - [`QueryResult`]: `JSON_Compact` result set with by-name column decoding

mod client;
mod response;

pub use client::{Connection, FireboltClient, FIREBOLT_AUDIENCE, UPDATE_ENDPOINT_HEADER};
pub use response::{QueryResult, Row};

use thiserror::Error;

use crate::auth::AuthError;

/// Errors returned by the Firebolt client.
#[derive(Debug, Error)]
pub enum FireboltError {
    /// Service account authentication failed.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Transport failure (connect, timeout, body read).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// System engine URL lookup failed for an account.
    #[error("failed to resolve system engine of account '{account}': {reason}")]
    EngineUrl { account: String, reason: String },

    /// Statement rejected by the engine.
    #[error("query failed ({status}): {message}")]
    Query {
        status: reqwest::StatusCode,
        message: String,
    },

    /// Switching to an engine did not yield a usable endpoint.
    #[error("failed to switch to engine '{engine}': {reason}")]
    UseEngine { engine: String, reason: String },

    /// A column value could not be converted to the requested type.
    #[error("cannot decode column '{column}': {reason}")]
    Decode { column: String, reason: String },
}
