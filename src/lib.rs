//! SLH payment gateway
//!
//! Backend for the SLH membership payment flow. The website posts payment
//! claims here; moderators review them from a token-protected dashboard.
//!
//! How it works:
//! 1. A buyer pays off-platform (bank, Paybox, Bit, PayPal, Telegram Stars)
//!    or transfers SLH tokens on BSC.
//! 2. The site submits a claim with proof. Manual payments start pending and
//!    page the moderators channel; BSC transfers are checked against the
//!    chain explorer and recorded already approved.
//! 3. A moderator approves or rejects each pending claim. Approval sends the
//!    buyer a personal referral link and the community invite. Decisions are
//!    final.

pub mod bscscan;
pub mod claims;
pub mod config;
pub mod links;
pub mod notify;
pub mod pg_storage;
pub mod proof;
pub mod server;

pub use bscscan::BscScanClient;
pub use claims::{ClaimStatus, NewClaim, PaymentClaim, PaymentMethod};
pub use config::Config;
pub use notify::Notifier;
pub use pg_storage::{PgStorage, TransitionOutcome};
pub use server::{create_router, run_server, AppState};
