//! Telegram notifications
//!
//! Two messages exist in the claim lifecycle: an alert to the moderators
//! group when a new pending claim arrives, and the approval message carrying
//! the personal link to the member. Rejections are silent on purpose.
//!
//! Failures are returned to the caller, which logs them; a lost Telegram
//! message never fails the request that triggered it.

use anyhow::Result;
use serde_json::json;
use tracing::debug;

use crate::claims::{PaymentClaim, PaymentMethod};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

pub struct Notifier {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
    moderators_chat_id: String,
    community_group_link: String,
}

impl Notifier {
    pub fn new(
        bot_token: String,
        moderators_chat_id: String,
        community_group_link: String,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: TELEGRAM_API_BASE.to_string(),
            bot_token,
            moderators_chat_id,
            community_group_link,
        }
    }

    /// Alert the moderators group about a new pending claim
    pub async fn notify_moderators(&self, claim: &PaymentClaim) -> Result<()> {
        self.send_message(&self.moderators_chat_id, &moderator_alert_text(claim))
            .await
    }

    /// Send the member their personal link after approval. The member's chat
    /// id on Telegram is their user id.
    pub async fn notify_user(&self, user_id: &str, personal_link: &str) -> Result<()> {
        self.send_message(user_id, &approval_text(personal_link, &self.community_group_link))
            .await
    }

    async fn send_message(&self, chat_id: &str, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "Markdown",
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("sendMessage to {} failed: {} {}", chat_id, status, body);
        }

        debug!("Sent Telegram message to {}", chat_id);
        Ok(())
    }
}

/// Moderator alert for a new pending claim
pub fn moderator_alert_text(claim: &PaymentClaim) -> String {
    format!(
        "💰 *אישור תשלום חדש התקבל!*\n\n\
         👤 user_id: `{}`\n\
         📛 שם: {}\n\
         💬 username: {}\n\
         💳 שיטת תשלום: {}\n\
         🧾 אסמכתא: {}\n\
         🕐 זמן: {}",
        claim.user_id,
        claim.display_name(),
        claim.username.as_deref().unwrap_or("(ללא username)"),
        method_label(claim.method),
        if claim.proof.is_empty() {
            "(לא צורפה)"
        } else {
            claim.proof.as_str()
        },
        claim.created_at.format("%Y-%m-%d %H:%M:%S"),
    )
}

/// Approval message with the member's personal link
pub fn approval_text(personal_link: &str, community_group_link: &str) -> String {
    format!(
        "🎉 *התשלום אושר! ברוך הבא לבעלי הנכסים!*\n\n\
         💎 *הנכס הדיגיטלי שלך מוכן:*\n\
         🔗 *לינק אישי:* `{}`\n\n\
         🚀 *מה עכשיו?*\n\
         1. שתף את הלינק עם אחרים\n\
         2. כל רכישה דרך הלינק שלך מתועדת\n\
         3. צבור הכנסה מהפצות\n\n\
         👥 *גישה לקהילה:*\n{}",
        personal_link, community_group_link
    )
}

fn method_label(method: PaymentMethod) -> &'static str {
    match method {
        PaymentMethod::Bank => "העברה בנקאית",
        PaymentMethod::Paybox => "פייבוקס",
        PaymentMethod::Bit => "ביט",
        PaymentMethod::Paypal => "PayPal",
        PaymentMethod::Telegram => "טלגרם",
        PaymentMethod::Bsc => "קריפטו (BSC)",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::ClaimStatus;
    use chrono::Utc;

    fn sample_claim() -> PaymentClaim {
        PaymentClaim {
            id: 12,
            user_id: "5551234".to_string(),
            username: Some("dana_l".to_string()),
            first_name: "Dana".to_string(),
            last_name: Some("Levi".to_string()),
            method: PaymentMethod::Bit,
            proof: "1700000000_receipt.png".to_string(),
            wallet_address: None,
            personal_link: "https://slh-nft.com/ref/Ab3dE5f7_5551234".to_string(),
            status: ClaimStatus::Pending,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_moderator_alert_contains_claim_facts() {
        let text = moderator_alert_text(&sample_claim());
        assert!(text.contains("5551234"));
        assert!(text.contains("Dana Levi"));
        assert!(text.contains("dana_l"));
        assert!(text.contains("ביט"));
        assert!(text.contains("1700000000_receipt.png"));
    }

    #[test]
    fn test_moderator_alert_placeholders() {
        let mut claim = sample_claim();
        claim.username = None;
        claim.proof = String::new();

        let text = moderator_alert_text(&claim);
        assert!(text.contains("(ללא username)"));
        assert!(text.contains("(לא צורפה)"));
    }

    #[test]
    fn test_approval_text_carries_link() {
        let text = approval_text(
            "https://slh-nft.com/ref/Ab3dE5f7_5551234",
            "https://t.me/+group",
        );
        assert!(text.contains("https://slh-nft.com/ref/Ab3dE5f7_5551234"));
        assert!(text.contains("https://t.me/+group"));
    }
}
