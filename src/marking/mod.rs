//! Client for the external marking-code (KIZ) API.

pub mod client;
pub mod signer;

pub use client::{CodeIssuer, CodeIssuerError, MarkingClient, UnconfiguredIssuer};
pub use signer::{RequestSigner, SignerError};
