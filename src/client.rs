use std::sync::Mutex as StdMutex;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::commands;
use crate::logger::MessageLogger;
use crate::transport::{Transport, DEFAULT_CONNECT_TIMEOUT, DEFAULT_PORT, DEFAULT_READ_TIMEOUT};
use crate::types::{HcMode, HoldDuration};
use crate::{Error, Result};

pub struct NeoHubClientBuilder {
    host: String,
    port: u16,
    connect_timeout: Duration,
    read_timeout: Duration,
    log_path: Option<String>,
}

impl NeoHubClientBuilder {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            log_path: None,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    pub fn message_log(mut self, path: impl Into<String>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    pub fn build(self) -> NeoHubClient {
        let logger = self
            .log_path
            .map(|path| MessageLogger::new(&path).expect("failed to open log file"))
            .map(StdMutex::new);

        NeoHubClient {
            transport: Transport::new(self.host, self.port)
                .with_timeouts(self.connect_timeout, self.read_timeout),
            write_gate: Mutex::new(()),
            logger,
        }
    }
}

/// Client for one NeoHub.
///
/// The hub is a small embedded device that handles one command per
/// connection; write commands are funneled through a FIFO gate so at most
/// one write exchange is in flight, while read-only queries run as
/// independent, separately-timed exchanges. No retries happen here: a failed
/// exchange surfaces its error to the caller, and retry policy belongs to
/// the polling coordinator or to the caller itself (blindly retrying a
/// `SET_TEMP` that may have landed is not idempotent).
pub struct NeoHubClient {
    transport: Transport,
    write_gate: Mutex<()>,
    logger: Option<StdMutex<MessageLogger>>,
}

impl NeoHubClient {
    pub fn builder(host: impl Into<String>) -> NeoHubClientBuilder {
        NeoHubClientBuilder::new(host)
    }

    pub fn host(&self) -> &str {
        self.transport.host()
    }

    pub fn port(&self) -> u16 {
        self.transport.port()
    }

    /// Liveness probe: connect and close, no command. Used to validate a
    /// configured host before committing it.
    pub async fn ping(&self) -> bool {
        self.transport.probe().await
    }

    // -- Read queries --

    pub async fn get_live_data(&self) -> Result<Value> {
        self.read_query(commands::get_live_data()).await
    }

    pub async fn get_system(&self) -> Result<Value> {
        self.read_query(commands::get_system()).await
    }

    /// Legacy combined info query (older firmware).
    pub async fn get_info(&self) -> Result<Value> {
        self.read_query(commands::info()).await
    }

    pub async fn get_device_ids(&self) -> Result<Value> {
        self.read_query(commands::device_ids()).await
    }

    // -- Write commands --
    // Each returns the hub's raw reply string for logging by the caller.

    pub async fn set_temperature(&self, zone: &str, temp: f64) -> Result<String> {
        validate_temp(temp)?;
        self.write_command(commands::set_temp(temp, zone)).await
    }

    pub async fn set_cool_temp(&self, zone: &str, temp: f64) -> Result<String> {
        validate_temp(temp)?;
        self.write_command(commands::set_cool_temp(temp, zone)).await
    }

    pub async fn set_hc_mode(&self, zone: &str, mode: HcMode) -> Result<String> {
        self.write_command(commands::set_hc_mode(mode, zone)).await
    }

    /// Standby (frost protection) on or off.
    pub async fn set_frost(&self, zone: &str, on: bool) -> Result<String> {
        self.write_command(commands::frost(on, zone)).await
    }

    pub async fn set_away(&self, zone: &str, on: bool) -> Result<String> {
        self.write_command(commands::away(on, zone)).await
    }

    /// Temporary setpoint override for a bounded duration.
    pub async fn set_hold(&self, zone: &str, temp: f64, duration: HoldDuration) -> Result<String> {
        validate_temp(temp)?;
        self.write_command(commands::hold(temp, duration, zone)).await
    }

    pub async fn set_timer(&self, zone: &str, on: bool) -> Result<String> {
        self.write_command(commands::timer(on, zone)).await
    }

    pub async fn set_timer_hold(&self, zone: &str, on: bool, minutes: u32) -> Result<String> {
        self.write_command(commands::timer_hold(on, minutes, zone)).await
    }

    pub async fn set_manual(&self, zone: &str, on: bool) -> Result<String> {
        self.write_command(commands::manual(on, zone)).await
    }

    pub async fn enable_ntp(&self) -> Result<String> {
        self.write_command(commands::ntp_on()).await
    }

    // -- Helpers --

    async fn read_query(&self, command: Value) -> Result<Value> {
        let result = self.transport.exchange(&command).await;
        self.log(&command, &result);
        result
    }

    async fn write_command(&self, command: Value) -> Result<String> {
        let _gate = self.write_gate.lock().await;
        let result = self.transport.exchange(&command).await;
        self.log(&command, &result);
        let reply = result?;
        let outcome = commands::parse_reply(&reply)?;
        debug!(%command, %outcome, "hub accepted command");
        Ok(outcome)
    }

    fn log(&self, command: &Value, result: &Result<Value>) {
        if let Some(logger) = &self.logger {
            let mut logger = logger.lock().expect("message logger lock poisoned");
            match result {
                Ok(reply) => logger.log_exchange(command, "ok", Some(reply)),
                Err(e) => logger.log_exchange(command, &e.to_string(), None),
            }
        }
    }
}

fn validate_temp(temp: f64) -> Result<()> {
    if !temp.is_finite() {
        return Err(Error::Validation(format!("temperature not a finite number: {temp}")));
    }
    Ok(())
}
