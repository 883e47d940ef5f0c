//! Direct ledger-node API provider.
//!
//! Talks to an Everscale node's JSON-RPC surface (`net.query_collection`,
//! `tvm.run_get`, `boc.encode_boc`, `abi.*`, `processing.process_message`)
//! over HTTP. This provider never has custody of validator secrets, so every
//! key-management capability fails with [`LedgerError::Unsupported`] instead
//! of pretending to succeed.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::ObjectParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tracing::debug;

use esm_interface::{
    BocOp, ElectionRecord, GeneratedKey, LedgerError, LedgerService, SubmitStatus,
    TransactionInput, WalletKeys,
};

mod abi;
mod subfields;

/// Runtime configuration of the direct-API provider.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EverosConfig {
    /// The node's RPC endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Per-request timeout, in seconds.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    /// Maximum RPC response size, in bytes.
    #[serde(default = "default_max_response_size")]
    pub max_response_body_size: u32,
}

fn default_endpoint() -> String {
    "http://localhost:3030/".into()
}

const fn default_request_timeout_seconds() -> u64 {
    60
}

fn default_max_response_size() -> u32 {
    1024 * 1024 * 10 // 10 MB
}

impl Default for EverosConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            request_timeout_seconds: default_request_timeout_seconds(),
            max_response_body_size: default_max_response_size(),
        }
    }
}

/// [`LedgerService`] implementation backed by a ledger-node RPC endpoint.
pub struct EverosLedger {
    client: HttpClient,
    wallet_addr: String,
    wallet_keys: WalletKeys,
    // All run_get calls funnel through this single permit, FIFO.
    run_get_slot: Semaphore,
}

impl EverosLedger {
    /// Build a provider for the given endpoint and signing wallet.
    pub fn new(
        config: EverosConfig,
        wallet_addr: impl Into<String>,
        wallet_keys: WalletKeys,
    ) -> Result<Self, LedgerError> {
        let client = HttpClientBuilder::default()
            .max_request_size(config.max_response_body_size)
            .request_timeout(std::time::Duration::from_secs(
                config.request_timeout_seconds,
            ))
            .build(&config.endpoint)
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            wallet_addr: wallet_addr.into(),
            wallet_keys,
            run_get_slot: Semaphore::new(1),
        })
    }

    async fn rpc(&self, method: &str, params: ObjectParams) -> Result<Value, LedgerError> {
        self.client
            .request::<Value, _>(method, params)
            .await
            .map_err(map_rpc_error)
    }

    async fn query_collection(
        &self,
        collection: &str,
        filter: Value,
        result: &str,
        order: Option<Value>,
        limit: Option<u32>,
    ) -> Result<Vec<Value>, LedgerError> {
        let mut params = ObjectParams::new();
        params.insert("collection", collection).expect("static key");
        params.insert("filter", filter).expect("static key");
        params.insert("result", result).expect("static key");
        if let Some(order) = order {
            params.insert("order", order).expect("static key");
        }
        if let Some(limit) = limit {
            params.insert("limit", limit).expect("static key");
        }

        let response = self.rpc("net.query_collection", params).await?;
        match response.get("result") {
            Some(Value::Array(rows)) => Ok(rows.clone()),
            _ => Err(LedgerError::MalformedResponse(format!(
                "{collection} query returned no result array"
            ))),
        }
    }

    fn wallet_message_params(&self, input: &TransactionInput) -> Value {
        json!({
            "abi": { "type": "Contract", "value": abi::wallet() },
            "address": self.wallet_addr,
            "call_set": {
                "function_name": "submitTransaction",
                "input": {
                    "dest": input.dest,
                    "value": input.value.to_string(),
                    "bounce": input.bounce,
                    "allBalance": input.all_balance,
                    "payload": input.payload
                }
            },
            "is_internal": false,
            "signer": {
                "type": "Keys",
                "keys": { "public": self.wallet_keys.public, "secret": self.wallet_keys.secret }
            }
        })
    }

    /// Encode a signed wallet transfer without sending it. The console
    /// provider delivers the resulting message through the node itself.
    pub async fn encode_wallet_message(
        &self,
        input: &TransactionInput,
    ) -> Result<String, LedgerError> {
        let encode_params = self.wallet_message_params(input);
        let mut params = ObjectParams::new();
        for (key, value) in encode_params.as_object().expect("always an object") {
            params.insert(key, value).expect("static key");
        }

        let result = self.rpc("abi.encode_message", params).await?;
        result
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                LedgerError::MalformedResponse("encode_message returned no message".into())
            })
    }

    async fn decode_pool_event(&self, body: &str) -> Result<Option<Value>, LedgerError> {
        let mut params = ObjectParams::new();
        params
            .insert("abi", json!({ "type": "Contract", "value": abi::depool() }))
            .expect("static key");
        params.insert("body", body).expect("static key");
        params.insert("is_internal", true).expect("static key");

        // Foreign messages in the window may not decode against the pool
        // ABI; those are simply not the event we are after.
        match self.rpc("abi.decode_message_body", params).await {
            Ok(decoded) => Ok(Some(decoded)),
            Err(LedgerError::Rpc(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl LedgerService for EverosLedger {
    async fn get_config_param(&self, id: u32) -> Result<Value, LedgerError> {
        let rows = self
            .query_collection(
                "blocks",
                json!({}),
                "id prev_key_block_seqno",
                Some(json!([{ "path": "seq_no", "direction": "DESC" }])),
                Some(1),
            )
            .await?;
        let prev_key_block_seqno = rows
            .first()
            .and_then(|row| row.get("prev_key_block_seqno"))
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                LedgerError::MalformedResponse("failed to obtain prev_key_block_seqno".into())
            })?;

        let selection = format!(
            "master {{ config {{ p{id} {} }} }}",
            subfields::for_param(id)
        );
        let rows = self
            .query_collection(
                "blocks",
                json!({
                    "seq_no": { "eq": prev_key_block_seqno },
                    "workchain_id": { "eq": -1 }
                }),
                &selection,
                None,
                None,
            )
            .await?;

        Ok(rows
            .first()
            .and_then(|row| row.pointer(&format!("/master/config/p{id}")))
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn get_account_state(&self, addr: &str) -> Result<String, LedgerError> {
        let rows = self
            .query_collection("accounts", json!({ "id": { "eq": addr } }), "boc", None, None)
            .await?;
        rows.first()
            .and_then(|row| row.get("boc"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| LedgerError::MalformedResponse("failed to get account boc".into()))
    }

    async fn get_account_balance(&self, addr: &str) -> Result<u64, LedgerError> {
        let rows = self
            .query_collection(
                "accounts",
                json!({ "id": { "eq": addr } }),
                "balance",
                None,
                None,
            )
            .await?;
        rows.first()
            .and_then(|row| row.get("balance"))
            .and_then(parse_u64)
            .ok_or_else(|| {
                LedgerError::MalformedResponse(format!("no balance for account {addr}"))
            })
    }

    async fn submit_transaction(
        &self,
        input: &TransactionInput,
    ) -> Result<SubmitStatus, LedgerError> {
        let mut params = ObjectParams::new();
        params
            .insert("message_encode_params", self.wallet_message_params(input))
            .expect("static key");
        params.insert("send_events", false).expect("static key");

        let result = self.rpc("processing.process_message", params).await?;
        let success = result
            .pointer("/transaction/action/success")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        debug!(dest = %input.dest, value = input.value, success, "processed wallet transaction");

        Ok(SubmitStatus { success })
    }

    async fn run_get(
        &self,
        account_boc: &str,
        function: &str,
        inputs: &[String],
    ) -> Result<Value, LedgerError> {
        // Serialize all read-calls; the node chokes on concurrent get-method
        // execution against large states.
        let _permit = self
            .run_get_slot
            .acquire()
            .await
            .expect("run_get semaphore never closes");

        let mut params = ObjectParams::new();
        params.insert("account", account_boc).expect("static key");
        params.insert("function_name", function).expect("static key");
        if !inputs.is_empty() {
            params.insert("input", inputs).expect("static key");
        }

        let result = self.rpc("tvm.run_get", params).await?;
        Ok(result.get("output").cloned().unwrap_or(Value::Null))
    }

    async fn encode_boc(&self, builder: &[BocOp]) -> Result<String, LedgerError> {
        let mut params = ObjectParams::new();
        params.insert("builder", builder).expect("static key");

        let result = self.rpc("boc.encode_boc", params).await?;
        result
            .get("boc")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| LedgerError::MalformedResponse("encode_boc returned no boc".into()))
    }

    async fn encode_pool_ticktock(&self) -> Result<String, LedgerError> {
        let mut params = ObjectParams::new();
        params
            .insert("abi", json!({ "type": "Contract", "value": abi::depool() }))
            .expect("static key");
        params
            .insert(
                "call_set",
                json!({ "function_name": "ticktock", "input": {} }),
            )
            .expect("static key");
        params.insert("is_internal", true).expect("static key");
        params
            .insert("signer", json!({ "type": "None" }))
            .expect("static key");

        let result = self.rpc("abi.encode_message_body", params).await?;
        result
            .get("body")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                LedgerError::MalformedResponse("encode_message_body returned no body".into())
            })
    }

    async fn find_stake_signing_request(
        &self,
        pool_addr: &str,
        election_id: u32,
    ) -> Result<Option<String>, LedgerError> {
        let rows = self
            .query_collection(
                "messages",
                json!({
                    "src": { "eq": pool_addr },
                    "msg_type": { "eq": 2 },
                    "created_at": { "gt": now() - 86400 }
                }),
                "body",
                None,
                None,
            )
            .await?;

        // The pool may emit the event several times; the latest one wins.
        let mut found = None;
        for row in &rows {
            let Some(body) = row.get("body").and_then(Value::as_str) else {
                continue;
            };
            let Some(decoded) = self.decode_pool_event(body).await? else {
                continue;
            };
            let matches = decoded.get("name").and_then(Value::as_str)
                == Some("StakeSigningRequested")
                && decoded
                    .pointer("/value/electionId")
                    .and_then(parse_u64)
                    .is_some_and(|id| id == u64::from(election_id));
            if matches {
                found = decoded
                    .pointer("/value/proxy")
                    .and_then(Value::as_str)
                    .map(str::to_string);
            }
        }

        Ok(found)
    }

    async fn generate_key_pair(&self) -> Result<GeneratedKey, LedgerError> {
        Err(LedgerError::Unsupported("key generation"))
    }

    async fn export_public_key(&self, _key: &str) -> Result<String, LedgerError> {
        Err(LedgerError::Unsupported("public key export"))
    }

    async fn sign(&self, _key: &str, _data_hex: &str) -> Result<String, LedgerError> {
        Err(LedgerError::Unsupported("signing"))
    }

    async fn install_validator_keys(
        &self,
        _election_id: u32,
        _validation_period: u32,
        _key: &str,
        _adnl_key: &str,
    ) -> Result<(), LedgerError> {
        Err(LedgerError::Unsupported("validator key installation"))
    }

    async fn restore_validator_keys(&self, _record: &ElectionRecord) -> Result<(), LedgerError> {
        // No local key custody; restoration only works through the console.
        Err(LedgerError::Unsupported("validator key restoration"))
    }

    async fn get_time_diff(&self) -> Result<i64, LedgerError> {
        Err(LedgerError::Unsupported("node time diagnostics"))
    }

    async fn count_block_signatures(
        &self,
        node_ids: &[String],
        interval_secs: u64,
    ) -> Result<u64, LedgerError> {
        if node_ids.is_empty() {
            return Ok(0);
        }
        let le = now();
        let rows = self
            .query_collection(
                "blocks_signatures",
                json!({
                    "gen_utime": { "gt": le - interval_secs, "le": le },
                    "signatures": { "any": { "node_id": { "in": node_ids } } }
                }),
                "id",
                None,
                None,
            )
            .await?;
        Ok(rows.len() as u64)
    }
}

fn map_rpc_error(err: jsonrpsee::core::Error) -> LedgerError {
    match err {
        jsonrpsee::core::Error::Call(e) => LedgerError::Rpc(e.to_string()),
        other => LedgerError::Transport(other.to_string()),
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs()
}

/// Node collections return integers as numbers, decimal strings or
/// `0x`-prefixed strings depending on the field.
fn parse_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => {
            if let Some(hex) = s.strip_prefix("0x") {
                u64::from_str_radix(hex, 16).ok()
            } else {
                s.parse().ok()
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    use super::*;

    async fn setup() -> (MockServer, EverosLedger) {
        let server = MockServer::start().await;
        let ledger = EverosLedger::new(
            EverosConfig {
                endpoint: server.uri(),
                ..Default::default()
            },
            "0:1111111111111111111111111111111111111111111111111111111111111111",
            WalletKeys::default(),
        )
        .unwrap();
        (server, ledger)
    }

    fn rpc_result(result: Value) -> impl Fn(&Request) -> ResponseTemplate + Send + Sync {
        move |req: &Request| {
            let body: Value = serde_json::from_slice(&req.body).unwrap();
            ResponseTemplate::new(200)
                .append_header("Content-Type", "application/json")
                .set_body_json(json!({
                    "jsonrpc": "2.0",
                    "id": body["id"],
                    "result": result
                }))
        }
    }

    #[tokio::test]
    async fn balance_parses_decimal_strings() {
        let (server, ledger) = setup().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(rpc_result(
                json!({ "result": [ { "balance": "123456789000" } ] }),
            ))
            .mount(&server)
            .await;

        let balance = ledger.get_account_balance("0:ab").await.unwrap();
        assert_eq!(balance, 123_456_789_000);
    }

    #[tokio::test]
    async fn missing_account_is_a_malformed_response() {
        let (server, ledger) = setup().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(rpc_result(json!({ "result": [] })))
            .mount(&server)
            .await;

        let err = ledger.get_account_state("0:ab").await.unwrap_err();
        assert!(matches!(err, LedgerError::MalformedResponse(_)), "{err}");
    }

    #[tokio::test]
    async fn submit_reports_action_success() {
        let (server, ledger) = setup().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(rpc_result(
                json!({ "transaction": { "action": { "success": false } } }),
            ))
            .mount(&server)
            .await;

        let status = ledger
            .submit_transaction(&TransactionInput {
                dest: "0:cd".into(),
                value: 1_000_000_000,
                bounce: true,
                all_balance: false,
                payload: "te6cc".into(),
            })
            .await
            .unwrap();
        assert!(!status.success);
    }

    #[tokio::test]
    async fn server_errors_map_to_transport() {
        let (server, ledger) = setup().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = ledger.get_account_balance("0:ab").await.unwrap_err();
        assert!(matches!(err, LedgerError::Transport(_)), "{err}");
    }

    #[test]
    fn parse_u64_accepts_all_node_shapes() {
        assert_eq!(parse_u64(&json!(7)), Some(7));
        assert_eq!(parse_u64(&json!("7")), Some(7));
        assert_eq!(parse_u64(&json!("0x10")), Some(16));
        assert_eq!(parse_u64(&json!(null)), None);
    }
}
