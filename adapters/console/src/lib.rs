//! Administrative console provider.
//!
//! Reaches the chain through the validator node's own `console` binary,
//! which holds the validator keyring. Key management, signing and message
//! delivery go through console subcommands; read-side capabilities with no
//! console equivalent (BOC encoding, get-method execution, event scans) are
//! delegated to an embedded direct-API provider.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64_ENGINE;
use base64::Engine;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, warn};

use esm_everos::EverosLedger;
use esm_interface::{
    BocOp, ElectionRecord, GeneratedKey, LedgerError, LedgerService, SubmitStatus,
    TransactionInput,
};

mod output;

/// Runtime configuration of the console provider.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ConsoleConfig {
    /// The console executable.
    #[serde(default = "default_cmd")]
    pub cmd: String,
    /// Path to the console's connection configuration file.
    #[serde(default = "default_config_path")]
    pub config_path: String,
    /// Hard deadline for one console invocation, in seconds.
    #[serde(default = "default_command_timeout_seconds")]
    pub command_timeout_seconds: u64,
}

fn default_cmd() -> String {
    "console".into()
}

fn default_config_path() -> String {
    "console.json".into()
}

const fn default_command_timeout_seconds() -> u64 {
    60
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            cmd: default_cmd(),
            config_path: default_config_path(),
            command_timeout_seconds: default_command_timeout_seconds(),
        }
    }
}

/// [`LedgerService`] implementation backed by the node's `console` binary.
pub struct ConsoleLedger {
    config: ConsoleConfig,
    inner: EverosLedger,
}

impl ConsoleLedger {
    /// Build a provider around the console binary and a direct-API fallback
    /// used for encoding and read-side queries.
    pub fn new(config: ConsoleConfig, inner: EverosLedger) -> Self {
        Self { config, inner }
    }

    /// Run one console invocation carrying `commands` in order. The child is
    /// killed once the deadline passes.
    async fn exec(&self, commands: &[String]) -> Result<String, LedgerError> {
        let mut cmd = Command::new(&self.config.cmd);
        cmd.arg("-j").arg("-C").arg(&self.config.config_path);
        for command in commands {
            cmd.arg("-c").arg(command);
        }
        cmd.kill_on_drop(true);

        debug!(commands = ?commands, "executing console command");
        let output = tokio::time::timeout(
            Duration::from_secs(self.config.command_timeout_seconds),
            cmd.output(),
        )
        .await
        .map_err(|_| {
            LedgerError::Console(format!(
                "console did not finish within {}s",
                self.config.command_timeout_seconds
            ))
        })?
        .map_err(|e| LedgerError::Console(format!("failed to run {}: {e}", self.config.cmd)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LedgerError::Console(format!(
                "console exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn exec_one(&self, command: String) -> Result<String, LedgerError> {
        self.exec(std::slice::from_ref(&command)).await
    }
}

fn ensure_key(name: &'static str, key: &str) -> Result<(), LedgerError> {
    if key.len() == 64 && key.bytes().all(|b| b.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(LedgerError::Console(format!("{name} is not a 64-hex key: {key:?}")))
    }
}

#[async_trait]
impl LedgerService for ConsoleLedger {
    async fn get_config_param(&self, id: u32) -> Result<Value, LedgerError> {
        let stdout = self.exec_one(format!("getconfig {id}")).await?;
        let config: Value = serde_json::from_str(&stdout)
            .map_err(|e| LedgerError::Console(format!("unparseable getconfig output: {e}")))?;
        Ok(config.get(format!("p{id}")).cloned().unwrap_or(Value::Null))
    }

    async fn get_account_state(&self, addr: &str) -> Result<String, LedgerError> {
        let file = tempfile::Builder::new()
            .suffix("account-state.boc")
            .tempfile()
            .map_err(|e| LedgerError::Console(format!("failed to create state file: {e}")))?;
        let path = file.path().display().to_string();

        let stdout = self.exec_one(format!("getaccountstate {addr} {path}")).await?;
        if stdout.starts_with("Error") {
            return Err(output::state_error(&stdout));
        }

        let boc = tokio::fs::read(file.path())
            .await
            .map_err(|e| LedgerError::Console(format!("failed to read state file: {e}")))?;
        Ok(B64_ENGINE.encode(boc))
    }

    async fn get_account_balance(&self, addr: &str) -> Result<u64, LedgerError> {
        let stdout = self.exec_one(format!("getaccount {addr}")).await?;
        let account: Value = serde_json::from_str(&stdout)
            .map_err(|e| LedgerError::Console(format!("unparseable getaccount output: {e}")))?;

        if account.get("acc_type").and_then(Value::as_str) == Some("Nonexist") {
            return Err(LedgerError::Console(format!("account {addr} does not exist")));
        }
        account
            .get("balance")
            .and_then(output::account_u64)
            .ok_or_else(|| LedgerError::Console(format!("no balance for account {addr}")))
    }

    async fn submit_transaction(
        &self,
        input: &TransactionInput,
    ) -> Result<SubmitStatus, LedgerError> {
        let message = self.inner.encode_wallet_message(input).await?;
        let raw = B64_ENGINE
            .decode(&message)
            .map_err(|e| LedgerError::MalformedResponse(format!("bad message encoding: {e}")))?;

        let file = tempfile::Builder::new()
            .suffix("msg-body.boc")
            .tempfile()
            .map_err(|e| LedgerError::Console(format!("failed to create message file: {e}")))?;
        tokio::fs::write(file.path(), raw)
            .await
            .map_err(|e| LedgerError::Console(format!("failed to write message file: {e}")))?;

        let stdout = self
            .exec_one(format!("sendmessage {}", file.path().display()))
            .await?;
        let success = stdout.contains("success");
        if !success {
            warn!(stdout = %stdout.trim(), "sendmessage was not accepted");
        }

        Ok(SubmitStatus { success })
    }

    async fn run_get(
        &self,
        account_boc: &str,
        function: &str,
        inputs: &[String],
    ) -> Result<Value, LedgerError> {
        self.inner.run_get(account_boc, function, inputs).await
    }

    async fn encode_boc(&self, builder: &[BocOp]) -> Result<String, LedgerError> {
        self.inner.encode_boc(builder).await
    }

    async fn encode_pool_ticktock(&self) -> Result<String, LedgerError> {
        self.inner.encode_pool_ticktock().await
    }

    async fn find_stake_signing_request(
        &self,
        pool_addr: &str,
        election_id: u32,
    ) -> Result<Option<String>, LedgerError> {
        self.inner.find_stake_signing_request(pool_addr, election_id).await
    }

    async fn generate_key_pair(&self) -> Result<GeneratedKey, LedgerError> {
        let stdout = self.exec_one("newkey".into()).await?;
        Ok(GeneratedKey {
            key: output::key_hash(&stdout)?,
            // The console never discloses secret material.
            secret: None,
        })
    }

    async fn export_public_key(&self, key: &str) -> Result<String, LedgerError> {
        ensure_key("key", key)?;
        let stdout = self.exec_one(format!("exportpub {key}")).await?;
        output::imported_key(&stdout)
    }

    async fn sign(&self, key: &str, data_hex: &str) -> Result<String, LedgerError> {
        ensure_key("key", key)?;
        if data_hex.is_empty() {
            return Err(LedgerError::Console("nothing to sign".into()));
        }
        let stdout = self.exec_one(format!("sign {key} {data_hex}")).await?;
        output::signature(&stdout)
    }

    async fn install_validator_keys(
        &self,
        election_id: u32,
        validation_period: u32,
        key: &str,
        adnl_key: &str,
    ) -> Result<(), LedgerError> {
        ensure_key("key", key)?;
        ensure_key("adnl key", adnl_key)?;
        let election_stop = election_id + validation_period;

        // One invocation; the console executes the commands in order.
        self.exec(&[
            format!("addpermkey {key} {election_id} {election_stop}"),
            format!("addtempkey {key} {key} {election_stop}"),
            format!("addadnl {adnl_key} \"0\""),
            format!("addvalidatoraddr {key} {adnl_key} {election_stop}"),
        ])
        .await?;

        Ok(())
    }

    async fn restore_validator_keys(&self, _record: &ElectionRecord) -> Result<(), LedgerError> {
        // The keyring lives inside the node; lost keys cannot be re-imported
        // from the outside.
        Err(LedgerError::Unsupported("validator key restoration"))
    }

    async fn get_time_diff(&self) -> Result<i64, LedgerError> {
        let stdout = self.exec_one("getstats".into()).await?;
        output::time_diff(&stdout)
    }

    async fn count_block_signatures(
        &self,
        node_ids: &[String],
        interval_secs: u64,
    ) -> Result<u64, LedgerError> {
        self.inner.count_block_signatures(node_ids, interval_secs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider_with_cmd(cmd: &str) -> ConsoleLedger {
        let inner = EverosLedger::new(
            esm_everos::EverosConfig {
                endpoint: "http://localhost:1/".into(),
                ..Default::default()
            },
            "0:0000000000000000000000000000000000000000000000000000000000000000",
            Default::default(),
        )
        .unwrap();
        ConsoleLedger::new(
            ConsoleConfig {
                cmd: cmd.into(),
                command_timeout_seconds: 5,
                ..Default::default()
            },
            inner,
        )
    }

    #[cfg(unix)]
    fn fake_console(dir: &tempfile::TempDir, script: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("console");
        std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn newkey_output_becomes_a_generated_key() {
        let dir = tempfile::tempdir().unwrap();
        let key = "f0".repeat(32);
        let cmd = fake_console(&dir, &format!("echo 'key hash: {key}'"));

        let generated = provider_with_cmd(&cmd).generate_key_pair().await.unwrap();
        assert_eq!(generated.key, key);
        assert!(generated.secret.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_is_a_console_error() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = fake_console(&dir, "echo 'broken pipe' >&2; exit 3");

        let err = provider_with_cmd(&cmd).get_time_diff().await.unwrap_err();
        assert!(matches!(err, LedgerError::Console(_)), "{err}");
        assert!(err.to_string().contains("broken pipe"));
    }

    #[tokio::test]
    async fn malformed_keys_are_rejected_before_spawning() {
        let err = provider_with_cmd("console-that-does-not-exist")
            .sign("not-a-key", "aa")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Console(_)), "{err}");
    }
}
