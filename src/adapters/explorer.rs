use async_trait::async_trait;
use chrono::DateTime;
use governor::{state::InMemoryState, state::NotKeyed, Quota, RateLimiter};
use rust_decimal::Decimal;
use serde_json::Value;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, info, warn};
use crate::adapters::traits::{
    Broadcaster, ChainReader, ExplorerTransaction, HistorySource, InternalTransaction, Page,
    SignedTransaction,
};
use crate::error::{DecodeError, ReconcileError, ReconcileResult, SubmissionError};
use crate::ledger::models::Chain;

const WEI_DECIMALS: u32 = 18;

/// Etherscan-compatible explorer API client.
pub struct ExplorerClient {
    api_url: String,
    api_key: String,
    http: reqwest::Client,
    limiter: RateLimiter<NotKeyed, InMemoryState, governor::clock::DefaultClock>,
}

impl ExplorerClient {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        requests_per_second: u32,
        timeout: Duration,
    ) -> ReconcileResult<Self> {
        let rps = NonZeroU32::new(requests_per_second).ok_or_else(|| {
            ReconcileError::Config("explorer requests_per_second must be positive".to_string())
        })?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReconcileError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
            http,
            limiter: RateLimiter::direct(Quota::per_second(rps)),
        })
    }

    /// Calls `module`/`action` and returns the `result` field.
    ///
    /// "No transactions found" style answers come back as an empty array.
    async fn call(&self, params: &[(&str, &str)]) -> ReconcileResult<Value> {
        self.limiter.until_ready().await;

        let response = self
            .http
            .get(&self.api_url)
            .query(params)
            .query(&[("apikey", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| ReconcileError::unavailable(Chain::Ethereum, format!("Explorer request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ReconcileError::unavailable(
                Chain::Ethereum,
                format!("Explorer returned {}", response.status()),
            ));
        }

        let json: Value = response.json().await.map_err(|e| {
            ReconcileError::unavailable(Chain::Ethereum, format!("Failed to parse response: {}", e))
        })?;

        if json["status"].as_str() == Some("0") {
            let message = json["message"].as_str().unwrap_or_default();
            if message.starts_with("No transactions found") || message.starts_with("No records found") {
                return Ok(Value::Array(Vec::new()));
            }
            // rate limits and backend hiccups both arrive as NOTOK
            return Err(ReconcileError::unavailable(
                Chain::Ethereum,
                format!("{}: {}", message, json["result"]),
            ));
        }

        Ok(json["result"].clone())
    }
}

#[async_trait]
impl HistorySource for ExplorerClient {
    type Raw = ExplorerTransaction;

    fn chain(&self) -> Chain {
        Chain::Ethereum
    }

    async fn fetch_page(
        &self,
        account: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> ReconcileResult<Page<ExplorerTransaction>> {
        let page: u32 = match cursor {
            Some(c) => c
                .parse()
                .map_err(|_| ReconcileError::InvalidInput(format!("bad explorer page cursor {}", c)))?,
            None => 1,
        };
        let page_param = page.to_string();
        let limit_param = limit.to_string();

        let result = self
            .call(&[
                ("module", "account"),
                ("action", "txlist"),
                ("address", account),
                ("startblock", "0"),
                ("endblock", "99999999"),
                ("page", &page_param),
                ("offset", &limit_param),
                ("sort", "asc"),
            ])
            .await?;

        let rows = result.as_array().cloned().unwrap_or_default();
        let full_page = rows.len() as u32 >= limit;
        let items = rows
            .iter()
            .filter_map(|row| match parse_transaction(row) {
                Ok(tx) => Some(tx),
                Err(e) => {
                    warn!(
                        "⚠️ Skipping malformed explorer row {}: {}",
                        row["hash"].as_str().unwrap_or("<no hash>"),
                        e
                    );
                    None
                }
            })
            .collect();

        debug!("txlist {} page {}: {} rows", account, page, rows.len());
        Ok(Page {
            items,
            next_cursor: full_page.then(|| (page + 1).to_string()),
        })
    }
}

#[async_trait]
impl ChainReader for ExplorerClient {
    async fn internal_transactions(&self, tx_hash: &str) -> ReconcileResult<Vec<InternalTransaction>> {
        let result = self
            .call(&[
                ("module", "account"),
                ("action", "txlistinternal"),
                ("txhash", tx_hash),
            ])
            .await?;

        Ok(result
            .as_array()
            .cloned()
            .unwrap_or_default()
            .iter()
            .map(|row| InternalTransaction {
                from: row["from"].as_str().unwrap_or_default().to_string(),
                to: non_empty(&row["to"]),
                contract_address: non_empty(&row["contractAddress"]),
                kind: row["type"].as_str().unwrap_or_default().to_string(),
                is_error: row["isError"].as_str() == Some("1"),
            })
            .collect())
    }

    async fn balance(&self, address: &str) -> ReconcileResult<Decimal> {
        let result = self
            .call(&[
                ("module", "account"),
                ("action", "balance"),
                ("address", address),
                ("tag", "latest"),
            ])
            .await?;

        let wei = result.as_str().ok_or_else(|| {
            ReconcileError::unavailable(Chain::Ethereum, format!("Unexpected balance result: {}", result))
        })?;
        wei_to_ether(wei).map_err(|e| ReconcileError::unavailable(Chain::Ethereum, e.to_string()))
    }
}

#[async_trait]
impl Broadcaster for ExplorerClient {
    async fn broadcast(&self, signed: &SignedTransaction) -> Result<String, SubmissionError> {
        self.limiter.until_ready().await;

        let response = self
            .http
            .post(&self.api_url)
            .form(&[
                ("module", "proxy"),
                ("action", "eth_sendRawTransaction"),
                ("hex", signed.payload.as_str()),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                SubmissionError::broadcast(
                    Chain::Ethereum,
                    signed.hash.clone(),
                    format!("Failed to submit transaction: {}", e),
                )
            })?;

        let json: Value = response.json().await.map_err(|e| {
            SubmissionError::broadcast(
                Chain::Ethereum,
                signed.hash.clone(),
                format!("Failed to parse response: {}", e),
            )
        })?;

        if let Some(message) = json["error"]["message"].as_str() {
            return Err(SubmissionError::broadcast(
                Chain::Ethereum,
                signed.hash.clone(),
                message.to_string(),
            ));
        }

        let tx_hash = json["result"]
            .as_str()
            .filter(|h| h.starts_with("0x"))
            .ok_or_else(|| {
                SubmissionError::broadcast(
                    Chain::Ethereum,
                    signed.hash.clone(),
                    format!("No transaction hash in response: {}", json),
                )
            })?
            .to_string();

        info!("Ethereum transaction submitted: {}", tx_hash);
        Ok(tx_hash)
    }
}

/// Integer wei string to whole ether, exactly.
pub fn wei_to_ether(wei: &str) -> Result<Decimal, DecodeError> {
    let raw: i128 = wei
        .trim()
        .parse()
        .map_err(|_| DecodeError::Amount(wei.to_string()))?;
    if raw < 0 {
        return Err(DecodeError::Amount(wei.to_string()));
    }
    Decimal::try_from_i128_with_scale(raw, WEI_DECIMALS)
        .map(|d| d.normalize())
        .map_err(|_| DecodeError::Amount(wei.to_string()))
}

fn non_empty(value: &Value) -> Option<String> {
    value.as_str().filter(|s| !s.is_empty()).map(str::to_string)
}

fn parse_transaction(row: &Value) -> Result<ExplorerTransaction, DecodeError> {
    let hash = row["hash"].as_str().ok_or(DecodeError::MissingField("hash"))?;
    let from = row["from"].as_str().ok_or(DecodeError::MissingField("from"))?;
    let value = wei_to_ether(row["value"].as_str().ok_or(DecodeError::MissingField("value"))?)?;

    let failed = row["isError"].as_str() == Some("1") || row["txreceipt_status"].as_str() == Some("0");

    Ok(ExplorerTransaction {
        hash: hash.to_string(),
        from: from.to_string(),
        to: non_empty(&row["to"]),
        value,
        input: row["input"].as_str().unwrap_or("0x").to_string(),
        is_error: failed,
        timestamp: row["timeStamp"]
            .as_str()
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
    })
}
