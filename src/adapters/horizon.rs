use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};
use crate::adapters::traits::{
    AssetBalance, Broadcaster, HistorySource, Page, PaymentLedgerReader, PaymentOperation,
    SignedTransaction,
};
use crate::error::{ReconcileError, ReconcileResult, SubmissionError};
use crate::ledger::models::{AssetKind, Chain};

/// Horizon REST client for the payment ledger.
pub struct HorizonClient {
    horizon_url: String,
    http: reqwest::Client,
}

impl HorizonClient {
    pub fn new(horizon_url: impl Into<String>, timeout: Duration) -> ReconcileResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReconcileError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            horizon_url: horizon_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    async fn get_json(&self, url: &str) -> ReconcileResult<Option<Value>> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ReconcileError::unavailable(Chain::Stellar, format!("GET {} failed: {}", url, e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ReconcileError::unavailable(
                Chain::Stellar,
                format!("GET {} returned {}", url, status),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReconcileError::InvalidInput(format!(
                "Horizon rejected {}: {} {}",
                url, status, body
            )));
        }

        let json = response.json::<Value>().await.map_err(|e| {
            ReconcileError::unavailable(Chain::Stellar, format!("Failed to parse response: {}", e))
        })?;
        Ok(Some(json))
    }
}

#[async_trait]
impl HistorySource for HorizonClient {
    type Raw = PaymentOperation;

    fn chain(&self) -> Chain {
        Chain::Stellar
    }

    async fn fetch_page(
        &self,
        account: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> ReconcileResult<Page<PaymentOperation>> {
        let mut url = format!(
            "{}/accounts/{}/payments?order=asc&limit={}&join=transactions",
            self.horizon_url, account, limit
        );
        if let Some(cursor) = cursor {
            url.push_str("&cursor=");
            url.push_str(cursor);
        }

        let Some(json) = self.get_json(&url).await? else {
            debug!("Account {} has no payment history", account);
            return Ok(Page::last(Vec::new()));
        };

        let records = json["_embedded"]["records"]
            .as_array()
            .cloned()
            .unwrap_or_default();

        // the cursor comes from the raw records so malformed ones are still stepped over
        let last_token = records
            .last()
            .and_then(|r| r["paging_token"].as_str())
            .map(str::to_string);
        let full_page = records.len() as u32 >= limit;

        let items = records
            .iter()
            .filter_map(|record| {
                let parsed = parse_payment(record);
                if parsed.is_none() {
                    warn!(
                        "⚠️ Skipping malformed Horizon record {}",
                        record["id"].as_str().unwrap_or("<no id>")
                    );
                }
                parsed
            })
            .collect();

        Ok(Page {
            items,
            next_cursor: if full_page { last_token } else { None },
        })
    }
}

#[async_trait]
impl PaymentLedgerReader for HorizonClient {
    async fn account_balances(&self, account: &str) -> ReconcileResult<Vec<AssetBalance>> {
        let url = format!("{}/accounts/{}", self.horizon_url, account);
        let Some(json) = self.get_json(&url).await? else {
            return Ok(Vec::new());
        };

        let balances = json["balances"].as_array().cloned().unwrap_or_default();
        balances
            .iter()
            .map(|b| -> ReconcileResult<AssetBalance> {
                let asset = parse_asset(
                    b["asset_type"].as_str().unwrap_or_default(),
                    b["asset_code"].as_str(),
                    b["asset_issuer"].as_str(),
                )
                .ok_or_else(|| {
                    ReconcileError::unavailable(Chain::Stellar, format!("Unrecognised balance entry: {}", b))
                })?;
                let balance = Decimal::from_str_exact(b["balance"].as_str().unwrap_or_default())?;
                Ok(AssetBalance { asset, balance })
            })
            .collect()
    }
}

#[async_trait]
impl Broadcaster for HorizonClient {
    async fn broadcast(&self, signed: &SignedTransaction) -> Result<String, SubmissionError> {
        let submit_url = format!("{}/transactions", self.horizon_url);
        let response = self
            .http
            .post(&submit_url)
            .form(&[("tx", signed.payload.as_str())])
            .send()
            .await
            .map_err(|e| {
                SubmissionError::broadcast(
                    Chain::Stellar,
                    signed.hash.clone(),
                    format!("Failed to submit transaction: {}", e),
                )
            })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SubmissionError::broadcast(
                Chain::Stellar,
                signed.hash.clone(),
                format!("Transaction submission failed: {}", error_text),
            ));
        }

        let json: Value = response.json().await.map_err(|e| {
            SubmissionError::broadcast(
                Chain::Stellar,
                signed.hash.clone(),
                format!("Failed to parse response: {}", e),
            )
        })?;

        let tx_hash = json["hash"]
            .as_str()
            .ok_or_else(|| {
                SubmissionError::broadcast(
                    Chain::Stellar,
                    signed.hash.clone(),
                    "No transaction hash in response",
                )
            })?
            .to_string();

        info!("Stellar transaction submitted: {}", tx_hash);
        Ok(tx_hash)
    }
}

/// Horizon asset triple to [`AssetKind`].
pub fn parse_asset(asset_type: &str, code: Option<&str>, issuer: Option<&str>) -> Option<AssetKind> {
    match asset_type {
        "native" => Some(AssetKind::NativeCurrency),
        "credit_alphanum4" | "credit_alphanum12" => Some(AssetKind::issued(code?, issuer?)),
        _ => None,
    }
}

fn parse_payment(record: &Value) -> Option<PaymentOperation> {
    let kind = record["type"].as_str()?.to_string();

    // create_account funds a new account with native currency under other names
    let (from, to, amount, asset_type) = if kind == "create_account" {
        (
            record["funder"].as_str()?,
            record["account"].as_str()?,
            record["starting_balance"].as_str()?,
            "native",
        )
    } else {
        (
            record["from"].as_str()?,
            record["to"].as_str()?,
            record["amount"].as_str()?,
            record["asset_type"].as_str()?,
        )
    };

    let transaction = &record["transaction"];
    let memo = (transaction["memo_type"].as_str() == Some("text"))
        .then(|| transaction["memo"].as_str().map(str::to_string))
        .flatten();

    Some(PaymentOperation {
        id: record["id"].as_str()?.to_string(),
        paging_token: record["paging_token"].as_str()?.to_string(),
        transaction_hash: record["transaction_hash"].as_str()?.to_string(),
        kind,
        from: from.to_string(),
        to: to.to_string(),
        amount: amount.to_string(),
        asset_type: asset_type.to_string(),
        asset_code: record["asset_code"].as_str().map(str::to_string),
        asset_issuer: record["asset_issuer"].as_str().map(str::to_string),
        memo,
        successful: record["transaction_successful"].as_bool().unwrap_or(true),
        created_at: record["created_at"]
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::GET, Method::POST, MockServer};
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn client(server: &MockServer) -> HorizonClient {
        HorizonClient::new(server.base_url(), Duration::from_secs(5)).unwrap()
    }

    fn payment(id: &str, to: &str, amount: &str, memo: Option<&str>) -> Value {
        json!({
            "id": id,
            "paging_token": id,
            "transaction_hash": format!("tx-{}", id),
            "type": "payment",
            "from": "GDONOR",
            "to": to,
            "amount": amount,
            "asset_type": "native",
            "transaction_successful": true,
            "created_at": "2024-03-01T12:00:00Z",
            "transaction": {
                "memo_type": if memo.is_some() { "text" } else { "none" },
                "memo": memo,
            }
        })
    }

    #[test]
    fn test_create_account_reads_funder_fields() {
        let record = json!({
            "id": "7",
            "paging_token": "7",
            "transaction_hash": "tx-7",
            "type": "create_account",
            "funder": "GFUNDER",
            "account": "GCUSTODY",
            "starting_balance": "2.5000000",
            "transaction": { "memo_type": "none" }
        });

        let op = parse_payment(&record).unwrap();
        assert_eq!(op.kind, "create_account");
        assert_eq!((op.from.as_str(), op.to.as_str()), ("GFUNDER", "GCUSTODY"));
        assert_eq!(op.amount, "2.5000000");
        assert_eq!(op.asset_type, "native");
        assert!(op.memo.is_none());
    }

    #[tokio::test]
    async fn test_fetch_page_parses_payments() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/accounts/GCUSTODY/payments")
                    .query_param("order", "asc")
                    .query_param("join", "transactions")
                    .query_param("limit", "2");
                then.status(200).json_body(json!({
                    "_embedded": { "records": [
                        payment("100", "GCUSTODY", "10.0000000", Some("issue/42")),
                        payment("101", "GCUSTODY", "5.5", None),
                    ]}
                }));
            })
            .await;

        let page = client(&server).fetch_page("GCUSTODY", None, 2).await.unwrap();
        mock.assert_async().await;

        assert_eq!(page.items.len(), 2);
        assert_eq!(page.next_cursor.as_deref(), Some("101"));
        assert_eq!(page.items[0].memo.as_deref(), Some("issue/42"));
        assert_eq!(page.items[0].amount, "10.0000000");
        assert!(page.items[1].memo.is_none());
        assert!(page.items[0].created_at.is_some());
    }

    #[tokio::test]
    async fn test_short_page_is_last_and_malformed_records_skipped() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/accounts/GCUSTODY/payments")
                    .query_param("cursor", "99");
                then.status(200).json_body(json!({
                    "_embedded": { "records": [
                        { "id": "100", "paging_token": "100", "type": "payment" },
                        payment("101", "GCUSTODY", "1", Some("issue/1")),
                    ]}
                }));
            })
            .await;

        let page = client(&server)
            .fetch_page("GCUSTODY", Some("99"), 200)
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, "101");
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_server_errors_are_unavailable_and_404_is_empty() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/accounts/GBUSY/payments");
                then.status(503);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/accounts/GNEW/payments");
                then.status(404);
            })
            .await;

        let client = client(&server);
        let err = client.fetch_page("GBUSY", None, 10).await.unwrap_err();
        assert!(err.is_retryable());

        let page = client.fetch_page("GNEW", None, 10).await.unwrap();
        assert!(page.items.is_empty());
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_account_balances() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/accounts/GCUSTODY");
                then.status(200).json_body(json!({
                    "balances": [
                        { "asset_type": "credit_alphanum4", "asset_code": "USDC",
                          "asset_issuer": "GISSUER", "balance": "12.5000000" },
                        { "asset_type": "native", "balance": "100.0000000" }
                    ]
                }));
            })
            .await;

        let balances = client(&server).account_balances("GCUSTODY").await.unwrap();
        assert_eq!(balances.len(), 2);
        assert_eq!(balances[0].asset, AssetKind::issued("USDC", "GISSUER"));
        assert_eq!(balances[0].balance, dec!(12.5));
        assert_eq!(balances[1].asset, AssetKind::NativeCurrency);
    }

    #[tokio::test]
    async fn test_broadcast_posts_envelope() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/transactions").body_contains("tx=AAAA");
                then.status(200).json_body(json!({ "hash": "abc123" }));
            })
            .await;

        let signed = SignedTransaction {
            chain: Chain::Stellar,
            hash: "abc123".into(),
            payload: "AAAA".into(),
        };
        let tx_id = client(&server).broadcast(&signed).await.unwrap();
        mock.assert_async().await;
        assert_eq!(tx_id, "abc123");
    }

    #[tokio::test]
    async fn test_rejected_broadcast_keeps_signed_hash() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/transactions");
                then.status(400).body("tx_bad_seq");
            })
            .await;

        let signed = SignedTransaction {
            chain: Chain::Stellar,
            hash: "abc123".into(),
            payload: "AAAA".into(),
        };
        let err = client(&server).broadcast(&signed).await.unwrap_err();
        assert!(err.may_have_landed());
        assert_eq!(err.signed_hash.as_deref(), Some("abc123"));
        assert!(err.message.contains("tx_bad_seq"));
    }

    #[test]
    fn test_parse_asset() {
        assert_eq!(parse_asset("native", None, None), Some(AssetKind::NativeCurrency));
        assert_eq!(
            parse_asset("credit_alphanum12", Some("LONGCODE"), Some("GI")),
            Some(AssetKind::issued("LONGCODE", "GI"))
        );
        assert_eq!(parse_asset("credit_alphanum4", Some("USDC"), None), None);
        assert_eq!(parse_asset("liquidity_pool_shares", None, None), None);
    }
}
