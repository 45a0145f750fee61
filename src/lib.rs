//! Conflict-tolerant batch submission of discounted line items into a remote basket.
//!
//! A run adds N line items to one server-side basket, one call at a time, and applies
//! a discount to each line right after it is added. The basket service rejects item
//! writes with 409 while a basket already exists for the session; the conflict body
//! names that basket, and the submitter adopts it and retries once. Each line carries
//! a 1-based sequence number the discount endpoint needs to address it.
//!
//! At the end of a run the [`RunSummary`] is classified into a [`TerminalDecision`]:
//! open the basket, do nothing, or stop and ask for the basket to be cleared by hand
//! when every discount conflicted.

pub mod cli;
pub mod domain;
pub mod error;
pub mod http;
pub mod ingest;
pub mod progress;
pub mod submit;

// Re-export commonly used types
pub use domain::{
    BasketId, DiscountKind, IdentityCapture, ItemFailure, LineItem, Outcome, RequestIdentity,
    RunSummary, Sku, TerminalDecision,
};
pub use error::{CaddieError, Result};
pub use http::{ApiRequest, HttpClient, HttpResponse, MockHttpClient, ReqwestHttpClient};
pub use progress::{ProgressEvent, ProgressReporter, Severity};
pub use submit::{BatchSubmitter, SubmitConfig, submit_batch};
