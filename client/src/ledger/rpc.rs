use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use log::{debug, info, trace, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{str::FromStr, time::Duration};
use tokio::time::sleep;
use url::Url;

use tasklane_common::{
    account::Account,
    crypto::{Hash, Pubkey, Signature},
    transaction::{serialize_transaction, Instruction, Message, RejectionKind},
};

use super::Ledger;
use crate::{config::ClientConfig, error::LedgerError, signer::Signer};

// Log line of the rollup transaction that carries the scheduled commit
const SCHEDULED_COMMIT_LOG: &str = "ScheduledCommitSent signature: ";
// Log line of the scheduled commit carrying the base ledger signature
const COMMITTED_LOG: &str = "ScheduledCommitSent signature[0]: ";

/// Configuration for RPC retries, timeouts and confirmation
#[derive(Debug, Clone)]
pub struct RpcLedgerConfig {
    pub request_timeout: Duration,
    pub connection_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub commitment: String,
    pub confirm_attempts: u32,
    pub confirm_interval: Duration,
}

impl From<&ClientConfig> for RpcLedgerConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            request_timeout: config.request_timeout(),
            connection_timeout: config.connection_timeout(),
            max_retries: config.max_rpc_retries,
            retry_delay: Duration::from_millis(config.rpc_retry_delay_ms),
            commitment: config.commitment.clone(),
            confirm_attempts: config.confirm_attempts,
            confirm_interval: Duration::from_millis(config.confirm_interval_ms),
        }
    }
}

impl Default for RpcLedgerConfig {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

/// JSON-RPC request structure
#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u32,
    method: &'a str,
    params: Value,
}

/// JSON-RPC response structure
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

/// JSON-RPC error structure
#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
    data: Option<Value>,
}

// Outcome of one HTTP exchange
enum RpcReply {
    Result(Value),
    Error(JsonRpcError),
}

#[derive(Debug, Deserialize)]
struct RpcAccount {
    lamports: u64,
    owner: String,
    // [payload, encoding]
    data: (String, String),
    #[serde(default)]
    executable: bool,
}

/// Ledger reached through its JSON-RPC endpoint, base ledger or rollup alike
pub struct RpcLedger {
    client: Client,
    url: Url,
    config: RpcLedgerConfig,
}

impl RpcLedger {
    pub fn new(address: &str) -> Result<Self> {
        Self::with_config(address, RpcLedgerConfig::default())
    }

    pub fn with_config(address: &str, config: RpcLedgerConfig) -> Result<Self> {
        let url = if address.starts_with("http://") || address.starts_with("https://") {
            Url::parse(address)?
        } else {
            Url::parse(&format!("http://{}", address))?
        };

        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connection_timeout)
            .build()?;

        Ok(Self {
            client,
            url,
            config,
        })
    }

    // Base ledger endpoint of the configuration
    pub fn base(config: &ClientConfig) -> Result<Self> {
        Self::with_config(&config.base_rpc_url, config.into())
    }

    // Rollup endpoint of the configuration
    pub fn rollup(config: &ClientConfig) -> Result<Self> {
        Self::with_config(&config.rollup_rpc_url, config.into())
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Make a JSON-RPC request, retrying transport failures only.
    ///
    /// JSON-RPC errors are answers from the node and returned as they are.
    async fn request(&self, method: &str, params: Value) -> Result<RpcReply> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: rand::random::<u32>(),
            method,
            params,
        };

        let mut last_error = None;
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                warn!(
                    "Retrying {} on {} (attempt {}/{})",
                    method, self.url, attempt, self.config.max_retries
                );
                sleep(self.config.retry_delay).await;
            }

            match self.single_request(&request).await {
                Ok(reply) => return Ok(reply),
                Err(e) => {
                    debug!("{} on {} failed: {:#}", method, self.url, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("Unknown error during request")))
    }

    async fn single_request(&self, request: &JsonRpcRequest<'_>) -> Result<RpcReply> {
        trace!("JSON-RPC {} {}", request.method, request.params);
        let response = self
            .client
            .post(self.url.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow!("Request timeout after {:?}", self.config.request_timeout)
                } else if e.is_connect() {
                    anyhow!("Connection failed: {}", e)
                } else {
                    anyhow!("Network error: {}", e)
                }
            })?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error {}: {}",
                response.status().as_u16(),
                response.status().canonical_reason().unwrap_or("Unknown error")
            ));
        }

        let reply: JsonRpcResponse = response
            .json()
            .await
            .context("Failed to parse JSON response")?;

        // a null result, like an unknown transaction, is a valid answer
        match reply.error {
            Some(error) => Ok(RpcReply::Error(error)),
            None => Ok(RpcReply::Result(reply.result.unwrap_or(Value::Null))),
        }
    }

    // Request whose JSON-RPC errors are transport failures for the caller
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        match self.request(method, params).await? {
            RpcReply::Result(value) => Ok(value),
            RpcReply::Error(error) => Err(anyhow!("RPC error {}: {}", error.code, error.message)),
        }
    }

    async fn latest_blockhash(&self) -> Result<Hash> {
        let result = self
            .call("getLatestBlockhash", json!([{ "commitment": self.config.commitment }]))
            .await?;
        let blockhash = result["value"]["blockhash"]
            .as_str()
            .ok_or_else(|| anyhow!("Missing blockhash in response"))?;
        Ok(Hash::from_str(blockhash)?)
    }

    // Wait for the submitted transaction to reach the configured commitment
    async fn confirm(&self, signature: &Signature) -> Result<(), LedgerError> {
        for _ in 0..self.config.confirm_attempts {
            let result = self
                .call(
                    "getSignatureStatuses",
                    json!([[signature.to_base58()], { "searchTransactionHistory": false }]),
                )
                .await?;

            let status = &result["value"][0];
            if !status.is_null() {
                if !status["err"].is_null() {
                    let logs = self
                        .transaction_logs(signature)
                        .await
                        .ok()
                        .flatten()
                        .unwrap_or_default();
                    return Err(LedgerError::from_rejection(status["err"].to_string(), logs));
                }

                let reached = match status["confirmationStatus"].as_str() {
                    Some("finalized") => true,
                    Some("confirmed") => self.config.commitment != "finalized",
                    Some("processed") => self.config.commitment == "processed",
                    _ => false,
                };
                if reached {
                    return Ok(());
                }
            }
            sleep(self.config.confirm_interval).await;
        }

        Err(LedgerError::Transport(anyhow!(
            "Transaction {} not confirmed after {} polls",
            signature,
            self.config.confirm_attempts
        )))
    }

    // Log messages of a transaction, `None` while it is unknown to the node
    async fn transaction_logs(&self, signature: &Signature) -> Result<Option<Vec<String>>> {
        let result = self
            .call(
                "getTransaction",
                json!([
                    signature.to_base58(),
                    {
                        "encoding": "json",
                        "commitment": self.config.commitment,
                        "maxSupportedTransactionVersion": 0
                    }
                ]),
            )
            .await?;

        if result.is_null() {
            return Ok(None);
        }

        Ok(Some(logs_of(&result["meta"]["logMessages"])))
    }
}

fn logs_of(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|lines| {
            lines
                .iter()
                .filter_map(|line| line.as_str().map(str::to_owned))
                .collect()
        })
        .unwrap_or_default()
}

// Signature following `prefix` in the first log line containing it
pub fn parse_log_signature(logs: &[String], prefix: &str) -> Option<Signature> {
    logs.iter().find_map(|line| {
        let (_, rest) = line.split_once(prefix)?;
        let candidate = rest.split_whitespace().next()?;
        Signature::from_str(candidate).ok()
    })
}

#[async_trait]
impl Ledger for RpcLedger {
    async fn get_account(&self, address: &Pubkey) -> Result<Option<Account>, LedgerError> {
        let result = self
            .call(
                "getAccountInfo",
                json!([
                    address.to_base58(),
                    { "encoding": "base64", "commitment": self.config.commitment }
                ]),
            )
            .await?;

        let value = &result["value"];
        if value.is_null() {
            return Ok(None);
        }

        let raw: RpcAccount = serde_json::from_value(value.clone())
            .context("Invalid account in getAccountInfo response")?;
        if raw.data.1 != "base64" {
            return Err(LedgerError::Transport(anyhow!(
                "Unexpected account encoding {}",
                raw.data.1
            )));
        }

        let data = STANDARD
            .decode(raw.data.0.as_bytes())
            .context("Invalid base64 account data")?;
        let owner = Pubkey::from_str(&raw.owner).context("Invalid account owner")?;

        Ok(Some(Account {
            lamports: raw.lamports,
            owner,
            data,
            executable: raw.executable,
        }))
    }

    async fn submit(
        &self,
        instructions: Vec<Instruction>,
        signer: &dyn Signer,
    ) -> Result<Signature, LedgerError> {
        let payer = signer.pubkey();
        let blockhash = self.latest_blockhash().await?;
        let message = Message::new(&instructions, &payer, blockhash)
            .map_err(|e| LedgerError::rejected(RejectionKind::Malformed, e.to_string()))?;

        if message.signer_keys().len() != 1 {
            // extra signers are expected to be derived addresses signed by a program
            return Err(LedgerError::rejected(
                RejectionKind::InsufficientAuthority,
                format!(
                    "missing required signature: transaction needs {} signers",
                    message.signer_keys().len()
                ),
            ));
        }

        let bytes = message.serialize();
        let signature = signer.sign_message(&bytes);
        let transaction = serialize_transaction(&[signature], &bytes);

        let reply = self
            .request(
                "sendTransaction",
                json!([
                    STANDARD.encode(transaction),
                    {
                        "encoding": "base64",
                        "skipPreflight": false,
                        "preflightCommitment": self.config.commitment
                    }
                ]),
            )
            .await?;

        match reply {
            RpcReply::Result(value) => {
                let returned = value
                    .as_str()
                    .and_then(|s| Signature::from_str(s).ok())
                    .ok_or_else(|| anyhow!("Invalid signature in sendTransaction response"))?;
                if returned != signature {
                    warn!("Node returned signature {} for {}", returned, signature);
                }
                info!("Submitted transaction {} to {}", signature, self.url);
                self.confirm(&signature).await?;
                Ok(signature)
            }
            RpcReply::Error(error) => {
                // preflight failures carry the simulation logs
                let logs = error
                    .data
                    .as_ref()
                    .map(|data| logs_of(&data["logs"]))
                    .unwrap_or_default();
                let message = match error.data.as_ref().map(|data| &data["err"]) {
                    Some(err) if !err.is_null() => format!("{} {}", error.message, err),
                    _ => error.message,
                };
                Err(LedgerError::from_rejection(message, logs))
            }
        }
    }

    async fn get_commitment_signature(
        &self,
        rollup_signature: &Signature,
    ) -> Result<Option<Signature>, LedgerError> {
        let Some(logs) = self.transaction_logs(rollup_signature).await? else {
            return Ok(None);
        };
        let Some(scheduled) = parse_log_signature(&logs, SCHEDULED_COMMIT_LOG) else {
            debug!("No scheduled commit in {}", rollup_signature);
            return Ok(None);
        };

        let Some(logs) = self.transaction_logs(&scheduled).await? else {
            return Ok(None);
        };
        Ok(parse_log_signature(&logs, COMMITTED_LOG))
    }

    async fn get_balance(&self, address: &Pubkey) -> Result<u64, LedgerError> {
        let result = self
            .call(
                "getBalance",
                json!([address.to_base58(), { "commitment": self.config.commitment }]),
            )
            .await?;
        result["value"]
            .as_u64()
            .ok_or_else(|| LedgerError::Transport(anyhow!("Invalid getBalance response")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commitment_logs() {
        let signature = Signature::new([9u8; 64]);
        let logs = vec![
            "Program Magic11111111111111111111111111111111111111 invoke [1]".to_string(),
            format!("{}{}", SCHEDULED_COMMIT_LOG, signature),
            "Program Magic11111111111111111111111111111111111111 success".to_string(),
        ];
        assert_eq!(parse_log_signature(&logs, SCHEDULED_COMMIT_LOG), Some(signature));
        assert_eq!(parse_log_signature(&logs, COMMITTED_LOG), None);

        let committed = vec![format!("{}{}", COMMITTED_LOG, signature)];
        assert_eq!(parse_log_signature(&committed, COMMITTED_LOG), Some(signature));
        // the shorter prefix must not pick the indexed line
        assert_eq!(parse_log_signature(&committed, SCHEDULED_COMMIT_LOG), None);
    }

    #[test]
    fn test_account_response_shape() {
        let value = json!({
            "lamports": 1_000_000,
            "owner": "11111111111111111111111111111111",
            "data": ["AQID", "base64"],
            "executable": false,
            "rentEpoch": 0
        });
        let raw: RpcAccount = serde_json::from_value(value).unwrap();
        assert_eq!(raw.lamports, 1_000_000);
        assert_eq!(STANDARD.decode(raw.data.0).unwrap(), vec![1, 2, 3]);
        assert_eq!(Pubkey::from_str(&raw.owner).unwrap(), Pubkey::zero());
    }

    #[test]
    fn test_address_without_scheme() {
        let ledger = RpcLedger::new("127.0.0.1:8899").unwrap();
        assert_eq!(ledger.url().as_str(), "http://127.0.0.1:8899/");
    }
}
