use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::Transport;

/// Telegram Bot API delivery. The subscriber id is the chat id.
#[derive(Clone)]
pub struct TelegramTransport {
    api_base: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl TelegramTransport {
    pub fn new(token: &str) -> Self {
        Self {
            api_base: format!("https://api.telegram.org/bot{token}"),
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    async fn backoff(attempt: u8) {
        tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[derive(Deserialize)]
struct ApiReply {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send(&self, subscriber: &str, text: &str) -> Result<()> {
        let url = format!("{}/sendMessage", self.api_base);
        let payload = SendMessage {
            chat_id: subscriber,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&url)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            match res {
                Ok(rsp) => {
                    let status = rsp.status();
                    // 4xx other than rate limiting will not get better on retry.
                    if status.is_client_error() && status.as_u16() != 429 {
                        let reply: Option<ApiReply> = rsp.json().await.ok();
                        let why = reply.and_then(|r| r.description).unwrap_or_default();
                        return Err(anyhow!("Telegram rejected message ({status}): {why}"));
                    }
                    if let Err(e) = rsp.error_for_status_ref() {
                        if attempt < self.max_retries {
                            Self::backoff(attempt).await;
                            continue;
                        }
                        return Err(anyhow!("Telegram HTTP error: {e}"));
                    }
                    let reply: ApiReply = rsp
                        .json()
                        .await
                        .map_err(|e| anyhow!("Telegram reply unreadable: {e}"))?;
                    if !reply.ok {
                        return Err(anyhow!(
                            "Telegram returned ok=false: {}",
                            reply.description.unwrap_or_default()
                        ));
                    }
                    return Ok(());
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        Self::backoff(attempt).await;
                        continue;
                    }
                    return Err(anyhow!("Telegram request failed: {e}"));
                }
            }
        }
    }

    fn name(&self) -> &str {
        "telegram"
    }
}
