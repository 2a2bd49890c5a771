//! Protocol builder integration.
//!
//! The builder owns the token contract logic: given operation parameters and
//! candidate fee inputs it returns an unsigned template. Signing and
//! broadcasting stay local.

pub mod client;
pub mod types;

pub use client::{HttpProtocolBuilder, ProtocolBuilder};
pub use types::{
    BuilderError, BuilderResult, FeeInputs, GenesisRequest, IssueRequest, RouteCheckRequest,
    TransferRequest, TxTemplate,
};
