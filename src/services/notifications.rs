//! Best-effort multi-channel notification dispatch.
//!
//! A channel with missing credentials degrades to "disabled"; transport
//! failures are logged and recorded in the send log. Nothing here ever
//! propagates an error into the pipeline that triggered the send.

use base64::Engine;
use chrono::Utc;
use reqwest::Client;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use strum::Display;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::NotificationConfig;
use crate::db::DbPool;
use crate::entities::{notification_log, order, product, return_request};
use crate::models::ReturnStatus;
use crate::money::format_minor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
    Chat,
    Webhook,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// The channel's credentials are absent; the send was skipped.
    Disabled,
    Failed(String),
}

impl SendOutcome {
    fn status(&self) -> &'static str {
        match self {
            SendOutcome::Sent => "sent",
            SendOutcome::Disabled => "disabled",
            SendOutcome::Failed(_) => "failed",
        }
    }
}

pub struct NotificationService {
    http: Client,
    config: NotificationConfig,
    db: Option<Arc<DbPool>>,
}

impl NotificationService {
    pub fn new(config: NotificationConfig, db: Option<Arc<DbPool>>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { http, config, db }
    }

    /// Sends one message over one channel. Never returns an error; the
    /// outcome lands in the send log and the caller's flow is unaffected.
    pub async fn send(
        &self,
        channel: Channel,
        recipient: &str,
        subject: Option<&str>,
        message: &str,
    ) -> SendOutcome {
        let outcome = match channel {
            Channel::Email => self.send_email(recipient, subject, message).await,
            Channel::Sms => self.send_sms(recipient, message).await,
            Channel::Chat => self.send_chat(message).await,
            Channel::Webhook => self.send_webhook(recipient, subject, message).await,
        };

        match &outcome {
            SendOutcome::Sent => debug!(%channel, recipient, "notification sent"),
            SendOutcome::Disabled => debug!(%channel, "notification channel disabled"),
            SendOutcome::Failed(reason) => {
                warn!(%channel, recipient, reason, "notification send failed")
            }
        }

        self.log_send(channel, recipient, subject, &outcome).await;
        outcome
    }

    async fn send_email(
        &self,
        recipient: &str,
        subject: Option<&str>,
        message: &str,
    ) -> SendOutcome {
        let Some(api_key) = &self.config.email_api_key else {
            return SendOutcome::Disabled;
        };

        let body = json!({
            "from": self.config.email_from,
            "to": [recipient],
            "subject": subject.unwrap_or("Notification"),
            "text": message,
        });

        let result = self
            .http
            .post(&self.config.email_api_url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await;

        into_outcome(result).await
    }

    async fn send_sms(&self, recipient: &str, message: &str) -> SendOutcome {
        let (Some(sid), Some(token), Some(from)) = (
            &self.config.sms_account_sid,
            &self.config.sms_auth_token,
            &self.config.sms_from_number,
        ) else {
            return SendOutcome::Disabled;
        };

        let url = format!(
            "{}/Accounts/{}/Messages.json",
            self.config.sms_api_url.trim_end_matches('/'),
            sid
        );
        let credentials =
            base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", sid, token));

        let result = self
            .http
            .post(&url)
            .header("Authorization", format!("Basic {}", credentials))
            .form(&[("From", from.as_str()), ("To", recipient), ("Body", message)])
            .send()
            .await;

        into_outcome(result).await
    }

    async fn send_chat(&self, message: &str) -> SendOutcome {
        let Some(url) = &self.config.chat_webhook_url else {
            return SendOutcome::Disabled;
        };

        let result = self.http.post(url).json(&json!({ "text": message })).send().await;
        into_outcome(result).await
    }

    async fn send_webhook(
        &self,
        recipient: &str,
        subject: Option<&str>,
        message: &str,
    ) -> SendOutcome {
        if !recipient.starts_with("http") {
            return SendOutcome::Failed("webhook recipient must be a url".to_string());
        }

        let result = self
            .http
            .post(recipient)
            .json(&json!({ "subject": subject, "text": message }))
            .send()
            .await;
        into_outcome(result).await
    }

    /// Append-only send log; failures here are themselves best-effort.
    async fn log_send(
        &self,
        channel: Channel,
        recipient: &str,
        subject: Option<&str>,
        outcome: &SendOutcome,
    ) {
        let Some(db) = &self.db else { return };

        let detail = match outcome {
            SendOutcome::Failed(reason) => Some(reason.clone()),
            _ => None,
        };
        let row = notification_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            channel: Set(channel.to_string()),
            recipient: Set(recipient.to_string()),
            subject: Set(subject.map(str::to_string)),
            status: Set(outcome.status().to_string()),
            detail: Set(detail),
            created_at: Set(Utc::now()),
        };

        if let Err(e) = row.insert(&**db).await {
            warn!(error = %e, "failed to append notification log");
        }
    }

    // ---- transition-driven templates ----

    pub async fn order_confirmation(&self, db: Option<&DbPool>, order_id: Uuid) {
        let Some(found) = load_order(db, order_id).await else {
            return;
        };
        let subject = format!("Order {} confirmed", found.order_number);
        let message = format!(
            "Hi {},\n\nwe received your payment of {} {} for order {}. \
             We'll let you know when it ships.",
            found.customer_name,
            format_minor(found.total_amount_minor),
            found.currency,
            found.order_number,
        );
        self.send(Channel::Email, &found.customer_email, Some(&subject), &message)
            .await;
    }

    pub async fn shipping_update(&self, db: Option<&DbPool>, order_id: Uuid) {
        let Some(found) = load_order(db, order_id).await else {
            return;
        };
        let subject = format!("Order {} is on its way", found.order_number);
        let tracking = match (&found.carrier, &found.tracking_number) {
            (Some(carrier), Some(number)) => format!("{} tracking number {}", carrier, number),
            (None, Some(number)) => format!("tracking number {}", number),
            _ => "tracking details will follow".to_string(),
        };
        let message = format!(
            "Hi {},\n\nyour order {} has shipped ({}).",
            found.customer_name, found.order_number, tracking,
        );
        self.send(Channel::Email, &found.customer_email, Some(&subject), &message)
            .await;
    }

    pub async fn delivery_update(&self, db: Option<&DbPool>, order_id: Uuid) {
        let Some(found) = load_order(db, order_id).await else {
            return;
        };
        let subject = format!("Order {} was delivered", found.order_number);
        let message = format!(
            "Hi {},\n\nyour order {} was delivered. Thanks for shopping with us!",
            found.customer_name, found.order_number,
        );
        self.send(Channel::Email, &found.customer_email, Some(&subject), &message)
            .await;
    }

    pub async fn return_status_update(
        &self,
        db: Option<&DbPool>,
        return_id: Uuid,
        status: ReturnStatus,
    ) {
        let Some(db) = db else { return };
        let Ok(Some(request)) = return_request::Entity::find_by_id(return_id).one(db).await else {
            return;
        };
        let Some(found) = load_order(Some(db), request.order_id).await else {
            return;
        };
        let subject = format!("Return update for order {}", found.order_number);
        let message = format!(
            "Hi {},\n\nthe return for order {} is now: {}.",
            found.customer_name, found.order_number, status,
        );
        self.send(Channel::Email, &found.customer_email, Some(&subject), &message)
            .await;
    }

    /// Stock fell to or below its threshold: alert the configured
    /// recipients and the chat channel.
    pub async fn stock_threshold_alert(
        &self,
        db: Option<&DbPool>,
        product_id: Uuid,
        stock: i32,
        threshold: i32,
    ) {
        let name = match db {
            Some(db) => product::Entity::find_by_id(product_id)
                .one(db)
                .await
                .ok()
                .flatten()
                .map(|p| p.name),
            None => None,
        }
        .unwrap_or_else(|| product_id.to_string());

        let subject = if stock == 0 {
            format!("OUT OF STOCK: {}", name)
        } else {
            format!("Low stock: {}", name)
        };
        let message = format!(
            "{} is at {} unit(s), threshold {}. Restock needed.",
            name, stock, threshold
        );

        for recipient in self.alert_recipients() {
            self.send(Channel::Email, &recipient, Some(&subject), &message)
                .await;
        }
        self.send(Channel::Chat, "stock-alerts", Some(&subject), &message)
            .await;
    }

    fn alert_recipients(&self) -> Vec<String> {
        self.config
            .alert_recipients
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .collect()
    }
}

async fn into_outcome(result: Result<reqwest::Response, reqwest::Error>) -> SendOutcome {
    match result {
        Ok(response) if response.status().is_success() => SendOutcome::Sent,
        Ok(response) => SendOutcome::Failed(format!("http status {}", response.status())),
        Err(e) => SendOutcome::Failed(e.to_string()),
    }
}

async fn load_order(db: Option<&DbPool>, order_id: Uuid) -> Option<order::Model> {
    let db = db?;
    order::Entity::find_by_id(order_id).one(db).await.ok()?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_channels_degrade_to_disabled() {
        let service = NotificationService::new(NotificationConfig::default(), None);

        assert_eq!(
            service
                .send(Channel::Email, "buyer@example.com", Some("hi"), "body")
                .await,
            SendOutcome::Disabled
        );
        assert_eq!(
            service.send(Channel::Sms, "+15550000000", None, "body").await,
            SendOutcome::Disabled
        );
        assert_eq!(
            service.send(Channel::Chat, "ops", None, "body").await,
            SendOutcome::Disabled
        );
    }

    #[tokio::test]
    async fn webhook_channel_rejects_non_urls() {
        let service = NotificationService::new(NotificationConfig::default(), None);
        assert!(matches!(
            service.send(Channel::Webhook, "not-a-url", None, "body").await,
            SendOutcome::Failed(_)
        ));
    }

    #[test]
    fn alert_recipient_csv_parsing() {
        let mut config = NotificationConfig::default();
        config.alert_recipients = Some("ops@example.com, buyer@example.com ,".to_string());
        let service = NotificationService::new(config, None);
        assert_eq!(
            service.alert_recipients(),
            vec!["ops@example.com".to_string(), "buyer@example.com".to_string()]
        );
    }
}
