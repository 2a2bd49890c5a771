//! Typed client for the ft-relay HTTP API.

pub mod client;

pub use client::{
    BalanceReply, ClientError, FtClient, HealthReply, IssueList, IssueSummary, Receiver,
    WalletReply,
};
