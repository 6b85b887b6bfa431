//! In-process NeoHub stand-in: a real TCP listener speaking the hub's frame
//! format (JSON command + `\0\r` in, JSON reply + `\n` out), recording every
//! command it receives.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[derive(Clone, Copy)]
pub struct HubOptions {
    /// Pause between receiving a command and replying.
    pub delay: Duration,
    /// Append the LF reply terminator (older-firmware framing).
    pub append_newline: bool,
    /// Keep the connection open this long after replying instead of
    /// closing, forcing the client down its timeout-with-data path.
    pub hold_open: Option<Duration>,
}

impl Default for HubOptions {
    fn default() -> Self {
        Self {
            delay: Duration::ZERO,
            append_newline: true,
            hold_open: None,
        }
    }
}

pub struct MockHub {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<Value>>>,
    offline: Arc<AtomicBool>,
    delay: Arc<Mutex<Duration>>,
}

impl MockHub {
    pub async fn start(
        responder: impl Fn(&Value) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self::start_with(HubOptions::default(), responder).await
    }

    pub async fn start_with(
        options: HubOptions,
        responder: impl Fn(&Value) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let offline = Arc::new(AtomicBool::new(false));
        let delay = Arc::new(Mutex::new(options.delay));

        let recorded = requests.clone();
        let down = offline.clone();
        let pause = delay.clone();
        tokio::spawn(async move {
            // The hub is half-duplex: one command, one reply, one connection.
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                if down.load(Ordering::SeqCst) {
                    // Accept then drop without replying, like a wedged hub.
                    continue;
                }

                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                loop {
                    match stream.read(&mut chunk).await {
                        Ok(0) => break,
                        Ok(n) => {
                            buf.extend_from_slice(&chunk[..n]);
                            if buf.contains(&0) {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }
                let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
                let Ok(command) = serde_json::from_slice::<Value>(&buf[..end]) else {
                    continue;
                };
                recorded.lock().unwrap().push(command.clone());

                let wait = *pause.lock().unwrap();
                if !wait.is_zero() {
                    tokio::time::sleep(wait).await;
                }
                if let Some(reply) = responder(&command) {
                    let _ = stream.write_all(reply.as_bytes()).await;
                    if options.append_newline {
                        let _ = stream.write_all(b"\n").await;
                    }
                }
                if let Some(hold) = options.hold_open {
                    tokio::time::sleep(hold).await;
                }
            }
        });

        Self {
            addr,
            requests,
            offline,
            delay,
        }
    }

    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }

    /// How many received commands had this top-level key.
    pub fn count(&self, command: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|req| req.get(command).is_some())
            .count()
    }

    /// Simulate the hub wedging: connections are accepted then dropped
    /// without a reply.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Change the reply delay for subsequent connections.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }
}

/// Responder answering the standard refresh queries with fixed payloads and
/// every write command with `{"result": "ok"}`.
pub fn standard_responder(
    live: Value,
    system: Value,
) -> impl Fn(&Value) -> Option<String> + Send + Sync + 'static {
    move |command: &Value| {
        if command.get("GET_LIVE_DATA").is_some() || command.get("INFO").is_some() {
            Some(live.to_string())
        } else if command.get("GET_SYSTEM").is_some() {
            Some(system.to_string())
        } else {
            Some(r#"{"result": "ok"}"#.to_string())
        }
    }
}
