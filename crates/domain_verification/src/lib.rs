//! Verification Domain - Who May Be Booked
//!
//! A host becomes bookable only after their verification is approved,
//! either by an admin reviewing uploaded documents or by the payment
//! processor reporting a payable connected account.
//!
//! ```text
//! unregistered -> requested -> documents_submitted -> pending_review -> approved
//!                                                          |    ^
//!                                                          v    |
//!                                                        rejected (new documents)
//! ```
//!
//! Activation links carry a single-use token that expires after a
//! configurable TTL (24 hours by default).

pub mod verification;
pub mod document;
pub mod ports;
pub mod service;
pub mod error;

pub use verification::{HostVerification, VerificationStatus, Reviewer, DEFAULT_TOKEN_TTL_HOURS};
pub use document::{VerificationDocument, DocumentKind, DocumentDecision, NewDocument};
pub use ports::{VerificationPort, VerificationWrite, DocumentStamp};
pub use service::VerificationService;
pub use error::VerificationError;
