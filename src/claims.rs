//! Payment claim model and lifecycle
//!
//! Claims enter as `pending` when submitted through the website form and as
//! `approved` when created from a verified on-chain transfer. Moderators move
//! pending claims to `approved` or `rejected`; both are terminal.

use chrono::{DateTime, Utc};
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Payment methods accepted by the membership flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql)]
#[serde(rename_all = "lowercase")]
#[postgres(name = "payment_method")]
pub enum PaymentMethod {
    #[postgres(name = "bank")]
    Bank,
    #[postgres(name = "paybox")]
    Paybox,
    #[postgres(name = "bit")]
    Bit,
    #[postgres(name = "paypal")]
    Paypal,
    #[postgres(name = "telegram")]
    Telegram,
    #[postgres(name = "bsc")]
    Bsc,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Bank => "bank",
            PaymentMethod::Paybox => "paybox",
            PaymentMethod::Bit => "bit",
            PaymentMethod::Paypal => "paypal",
            PaymentMethod::Telegram => "telegram",
            PaymentMethod::Bsc => "bsc",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown payment method: {0}")]
pub struct UnknownMethod(pub String);

impl FromStr for PaymentMethod {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bank" => Ok(PaymentMethod::Bank),
            "paybox" => Ok(PaymentMethod::Paybox),
            "bit" => Ok(PaymentMethod::Bit),
            "paypal" => Ok(PaymentMethod::Paypal),
            "telegram" => Ok(PaymentMethod::Telegram),
            "bsc" => Ok(PaymentMethod::Bsc),
            other => Err(UnknownMethod(other.to_string())),
        }
    }
}

/// Claim lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql)]
#[serde(rename_all = "lowercase")]
#[postgres(name = "claim_status")]
pub enum ClaimStatus {
    #[postgres(name = "pending")]
    Pending,
    #[postgres(name = "approved")]
    Approved,
    #[postgres(name = "rejected")]
    Rejected,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Pending => "pending",
            ClaimStatus::Approved => "approved",
            ClaimStatus::Rejected => "rejected",
        }
    }

    /// Approved and rejected claims never change again
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ClaimStatus::Pending)
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Moderation transition whitelist: pending -> approved, pending -> rejected
pub fn transition_allowed(from: ClaimStatus, to: ClaimStatus) -> bool {
    from == ClaimStatus::Pending
        && matches!(to, ClaimStatus::Approved | ClaimStatus::Rejected)
}

/// A stored payment claim
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentClaim {
    pub id: i32,
    pub user_id: String,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
    pub method: PaymentMethod,
    pub proof: String,
    pub wallet_address: Option<String>,
    pub personal_link: String,
    pub status: ClaimStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentClaim {
    /// Display name for moderator-facing messages
    pub fn display_name(&self) -> String {
        match &self.last_name {
            Some(last) => format!("{} {}", self.first_name, last),
            None => self.first_name.clone(),
        }
    }
}

/// A claim about to be inserted
#[derive(Debug, Clone)]
pub struct NewClaim {
    pub user_id: String,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
    pub method: PaymentMethod,
    pub proof: String,
    pub wallet_address: Option<String>,
    pub personal_link: String,
    pub status: ClaimStatus,
}

impl NewClaim {
    /// A manual submission from the website form. Always starts pending;
    /// the wallet address is only meaningful for BSC payments.
    #[allow(clippy::too_many_arguments)]
    pub fn submitted(
        user_id: String,
        username: Option<String>,
        first_name: String,
        last_name: Option<String>,
        method: PaymentMethod,
        proof: String,
        wallet_address: Option<String>,
        personal_link: String,
    ) -> Self {
        let wallet_address = if method == PaymentMethod::Bsc {
            wallet_address
        } else {
            None
        };

        Self {
            user_id,
            username,
            first_name,
            last_name,
            method,
            proof,
            wallet_address,
            personal_link,
            status: ClaimStatus::Pending,
        }
    }

    /// A claim backed by a verified on-chain transfer. Born approved,
    /// bypassing moderation.
    pub fn chain_verified(
        user_id: String,
        username: Option<String>,
        first_name: String,
        last_name: Option<String>,
        tx_hash: String,
        user_address: String,
        personal_link: String,
    ) -> Self {
        Self {
            user_id,
            username,
            first_name,
            last_name,
            method: PaymentMethod::Bsc,
            proof: tx_hash,
            wallet_address: Some(user_address),
            personal_link,
            status: ClaimStatus::Approved,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_whitelist() {
        use ClaimStatus::*;

        assert!(transition_allowed(Pending, Approved));
        assert!(transition_allowed(Pending, Rejected));

        // Terminal states never change
        assert!(!transition_allowed(Approved, Rejected));
        assert!(!transition_allowed(Approved, Pending));
        assert!(!transition_allowed(Rejected, Approved));
        assert!(!transition_allowed(Rejected, Pending));

        // Nothing transitions back to pending
        assert!(!transition_allowed(Pending, Pending));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!ClaimStatus::Pending.is_terminal());
        assert!(ClaimStatus::Approved.is_terminal());
        assert!(ClaimStatus::Rejected.is_terminal());
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("bsc".parse::<PaymentMethod>().unwrap(), PaymentMethod::Bsc);
        assert_eq!(
            "paybox".parse::<PaymentMethod>().unwrap(),
            PaymentMethod::Paybox
        );
        assert!("venmo".parse::<PaymentMethod>().is_err());
        // Parsing is exact, no case folding
        assert!("Bank".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn test_submitted_starts_pending() {
        let claim = NewClaim::submitted(
            "42".to_string(),
            Some("dana".to_string()),
            "Dana".to_string(),
            None,
            PaymentMethod::Bit,
            String::new(),
            None,
            "https://slh-nft.com/ref/AbCd1234_42".to_string(),
        );

        assert_eq!(claim.status, ClaimStatus::Pending);
        assert_eq!(claim.wallet_address, None);
    }

    #[test]
    fn test_wallet_only_recorded_for_bsc() {
        let bank = NewClaim::submitted(
            "7".to_string(),
            None,
            "Noa".to_string(),
            None,
            PaymentMethod::Bank,
            String::new(),
            Some("0xabc".to_string()),
            "link".to_string(),
        );
        assert_eq!(bank.wallet_address, None);

        let bsc = NewClaim::submitted(
            "7".to_string(),
            None,
            "Noa".to_string(),
            None,
            PaymentMethod::Bsc,
            "0xhash".to_string(),
            Some("0xabc".to_string()),
            "link".to_string(),
        );
        assert_eq!(bsc.wallet_address.as_deref(), Some("0xabc"));
    }

    #[test]
    fn test_chain_verified_born_approved() {
        let claim = NewClaim::chain_verified(
            "99".to_string(),
            None,
            "Avi".to_string(),
            None,
            "0xdeadbeef".to_string(),
            "0xWallet".to_string(),
            "link".to_string(),
        );

        assert_eq!(claim.status, ClaimStatus::Approved);
        assert_eq!(claim.method, PaymentMethod::Bsc);
        assert_eq!(claim.proof, "0xdeadbeef");
        assert_eq!(claim.wallet_address.as_deref(), Some("0xWallet"));
    }

    #[test]
    fn test_wire_serialization() {
        let claim = PaymentClaim {
            id: 1,
            user_id: "42".to_string(),
            username: None,
            first_name: "Dana".to_string(),
            last_name: Some("Levi".to_string()),
            method: PaymentMethod::Paypal,
            proof: String::new(),
            wallet_address: None,
            personal_link: "https://slh-nft.com/ref/aB3dE5f7_42".to_string(),
            status: ClaimStatus::Pending,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let value = serde_json::to_value(&claim).unwrap();
        assert_eq!(value["userId"], "42");
        assert_eq!(value["firstName"], "Dana");
        assert_eq!(value["method"], "paypal");
        assert_eq!(value["status"], "pending");
        assert!(value["personalLink"].as_str().unwrap().contains("/ref/"));
    }

    #[test]
    fn test_display_name() {
        let mut claim = PaymentClaim {
            id: 1,
            user_id: "42".to_string(),
            username: None,
            first_name: "Dana".to_string(),
            last_name: Some("Levi".to_string()),
            method: PaymentMethod::Bank,
            proof: String::new(),
            wallet_address: None,
            personal_link: String::new(),
            status: ClaimStatus::Pending,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(claim.display_name(), "Dana Levi");

        claim.last_name = None;
        assert_eq!(claim.display_name(), "Dana");
    }
}
