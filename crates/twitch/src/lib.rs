//! Streaming-platform integration: the consumed API surface, its HTTP
//! client, OAuth helpers and custody of broadcaster credentials.

pub mod api;
pub mod custody;
pub mod helix;
pub mod oauth;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod types;

pub use {
    api::PlatformApi,
    custody::CredentialCustodian,
    helix::HelixClient,
    oauth::{authorize_url, generate_state},
    types::{
        BroadcastStatus, CreatePrediction, PlatformUser, Prediction, PredictionOutcome,
        StreamInfo, TokenInfo, TokenPair,
    },
};
