//! Core domain types, free of any transport:
//! - Line items and their validation
//! - Request identity and its passive capture
//! - Basket wire contracts
//! - Call outcome classification
//! - Run state, summary and terminal decision

pub mod basket;
pub mod identity;
pub mod line_item;
pub mod outcome;
pub mod run;

pub use basket::{AddItemRequest, BasketId, DiscountRequest};
pub use identity::{ClientProfile, IdentityCapture, IdentityDefaults, RequestIdentity, ResolvedIdentity};
pub use line_item::{DiscountKind, LineItem, Sku};
pub use outcome::{ItemFailure, Outcome};
pub use run::{AddResult, BatchState, DiscountResult, LineReport, RunId, RunSummary, TerminalDecision};
