//! BscScan API client for on-chain payment verification
//!
//! Membership can be paid by transferring the community token to the
//! collection address. Verification is two steps against the explorer API:
//! the transaction receipt must report success, and the buyer's token
//! transfer history must contain that transaction, addressed to the
//! collection wallet, in the right token.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ChainConfig;

/// One entry from an address's token transfer history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenTransfer {
    pub hash: String,
    pub from: String,
    pub to: String,
    pub value: String,
    #[serde(rename = "tokenSymbol")]
    pub token_symbol: String,
}

impl TokenTransfer {
    /// Does this transfer settle the given transaction for our collection
    /// address? Addresses compare case-insensitively (explorers return
    /// lowercase, wallets display checksum case); hash and symbol are exact.
    pub fn matches(&self, tx_hash: &str, collection_address: &str, token_symbol: &str) -> bool {
        self.hash == tx_hash
            && self.to.eq_ignore_ascii_case(collection_address)
            && self.token_symbol == token_symbol
    }
}

pub struct BscScanClient {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    collection_address: String,
    token_contract: String,
    token_symbol: String,
    token_decimals: u32,
}

impl BscScanClient {
    pub fn new(chain: &ChainConfig, api_key: Option<String>) -> Self {
        if api_key.is_none() {
            warn!("BscScan client initialized WITHOUT API key - rate limits will be very low");
        }
        Self {
            client: reqwest::Client::new(),
            api_url: chain.api_url.clone(),
            api_key,
            collection_address: chain.collection_address.clone(),
            token_contract: chain.token_contract.clone(),
            token_symbol: chain.token_symbol.clone(),
            token_decimals: chain.token_decimals,
        }
    }

    fn build_request(&self, params: &[(&str, &str)]) -> reqwest::RequestBuilder {
        let mut req = self.client.get(&self.api_url).query(params);
        if let Some(key) = &self.api_key {
            req = req.query(&[("apikey", key.as_str())]);
        }
        req
    }

    /// Verify that `tx_hash` is a successful transfer of the community token
    /// from `user_address` to the collection address.
    ///
    /// Returns `Ok(false)` for anything that fails the checks; explorer
    /// errors bubble up so callers can log the reason and conservatively
    /// treat the payment as unverified.
    pub async fn verify_transfer(&self, tx_hash: &str, user_address: &str) -> Result<bool> {
        if !self.receipt_succeeded(tx_hash).await? {
            debug!("Receipt for {} did not report success", tx_hash);
            return Ok(false);
        }

        let transfers = self.token_transfers(user_address).await?;
        let verified = transfers
            .iter()
            .any(|t| t.matches(tx_hash, &self.collection_address, &self.token_symbol));

        if verified {
            info!("Verified {} transfer {} from {}", self.token_symbol, tx_hash, user_address);
        } else {
            debug!(
                "No matching {} transfer to {} found in {} history entries for {}",
                self.token_symbol,
                self.collection_address,
                transfers.len(),
                user_address
            );
        }

        Ok(verified)
    }

    /// Current token balance of an address in whole tokens.
    ///
    /// Informational only; any failure is logged and reported as 0.
    pub async fn token_balance(&self, address: &str) -> f64 {
        match self.fetch_token_balance(address).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!("Token balance lookup for {} failed: {}", address, e);
                0.0
            }
        }
    }

    async fn receipt_succeeded(&self, tx_hash: &str) -> Result<bool> {
        #[derive(Deserialize)]
        struct ReceiptResponse {
            result: ReceiptResult,
        }
        #[derive(Deserialize)]
        struct ReceiptResult {
            status: String,
        }

        let response = self
            .build_request(&[
                ("module", "transaction"),
                ("action", "gettxreceiptstatus"),
                ("txhash", tx_hash),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("Receipt status request failed: {}", response.status());
        }

        let data: ReceiptResponse = response
            .json()
            .await
            .context("Unexpected receipt status payload")?;

        Ok(data.result.status == "1")
    }

    async fn token_transfers(&self, address: &str) -> Result<Vec<TokenTransfer>> {
        #[derive(Deserialize)]
        struct TransferResponse {
            result: Vec<TokenTransfer>,
        }

        let response = self
            .build_request(&[
                ("module", "account"),
                ("action", "tokentx"),
                ("address", address),
                ("sort", "desc"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("Transfer history request failed: {}", response.status());
        }

        // "No transactions found" still carries an empty result array;
        // rate-limit errors carry a string and fail deserialization here.
        let data: TransferResponse = response
            .json()
            .await
            .context("Unexpected transfer history payload")?;

        Ok(data.result)
    }

    async fn fetch_token_balance(&self, address: &str) -> Result<f64> {
        #[derive(Deserialize)]
        struct BalanceResponse {
            status: String,
            result: String,
        }

        let response = self
            .build_request(&[
                ("module", "account"),
                ("action", "tokenbalance"),
                ("contractaddress", self.token_contract.as_str()),
                ("address", address),
                ("tag", "latest"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("Balance request failed: {}", response.status());
        }

        let data: BalanceResponse = response.json().await?;
        if data.status != "1" {
            anyhow::bail!("Balance lookup returned API status {}", data.status);
        }

        scale_balance(&data.result, self.token_decimals)
    }
}

/// Convert a raw integer token amount (wei-style string) into whole tokens
pub fn scale_balance(raw: &str, decimals: u32) -> Result<f64> {
    let raw: f64 = raw
        .trim()
        .parse()
        .with_context(|| format!("Non-numeric balance: {:?}", raw))?;
    Ok(raw / 10f64.powi(decimals as i32))
}
