// SPDX-License-Identifier: MIT

//! Telegram notification adapter (Bot API `sendMessage`)

use super::{Notification, Notifier};
use crate::config::TelegramSettings;
use crate::error::AdapterError;
use async_trait::async_trait;
use reqwest::Client;
use url::Url;

pub struct TelegramNotifier {
    client: Client,
    api_base: String,
    bot_token: Option<String>,
    chat_id: Option<String>,
}

impl TelegramNotifier {
    pub fn new(settings: &TelegramSettings) -> Result<Self, AdapterError> {
        Ok(Self {
            client: Client::builder().build()?,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            bot_token: settings.bot_token.clone(),
            chat_id: settings.chat_id.clone(),
        })
    }

    /// Build the `sendMessage` URL with query-encoded parameters
    fn send_url(&self, notification: &Notification) -> Result<Url, AdapterError> {
        let token = notification
            .bot_token
            .as_deref()
            .or(self.bot_token.as_deref())
            .ok_or_else(|| AdapterError::MissingApiKey("telegram".to_string()))?;
        let chat_id = notification
            .chat_id
            .as_deref()
            .or(self.chat_id.as_deref())
            .ok_or_else(|| AdapterError::InvalidResponse("no telegram chat_id".to_string()))?;

        Url::parse_with_params(
            &format!("{}/bot{}/sendMessage", self.api_base, token),
            &[("chat_id", chat_id), ("text", notification.text.as_str())],
        )
        .map_err(|e| AdapterError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), AdapterError> {
        let url = self.send_url(notification)?;
        let resp = self.client.post(url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(AdapterError::Status {
                provider: "telegram".to_string(),
                status: status.as_u16(),
                message,
                raw_output: None,
            });
        }
        Ok(())
    }
}
