use anyhow::Context;
use notifications::NotificationEmail;

#[async_trait::async_trait]
pub trait EmailSender: std::fmt::Debug + Send + Sync + 'static {
    async fn send(&self, email: NotificationEmail) -> anyhow::Result<()>;
}

/// Sends emails through an HTTP email delivery API, which resolves the
/// recipient account to its registered address.
#[derive(Debug)]
pub struct HttpSender {
    endpoint: url::Url,
    api_key: String,
    client: reqwest::Client,
}

#[derive(serde::Serialize)]
struct SendRequest<'a> {
    to_account_id: models::AccountId,
    template: notifications::TemplateKind,
    subject: &'a str,
    html: &'a str,
    idempotency_key: &'a str,
}

impl HttpSender {
    async fn send(&self, email: NotificationEmail) -> anyhow::Result<()> {
        let NotificationEmail {
            idempotency_key,
            to_account_id,
            template,
            subject,
            body,
        } = email;

        let request = SendRequest {
            to_account_id,
            template,
            subject: &subject,
            html: &body,
            idempotency_key: &idempotency_key,
        };

        self.client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .header("Idempotency-Key", &idempotency_key)
            .json(&request)
            .send()
            .await
            .context("calling email API")?
            .error_for_status()
            .context("email API rejected the request")?;

        tracing::info!(%idempotency_key, to = %to_account_id, %template, "sent incident email");
        Ok(())
    }
}

#[derive(Debug)]
pub enum Sender {
    /// Emails are logged and dropped.
    Disabled,
    Http(HttpSender),
}

impl Sender {
    pub fn http(endpoint: url::Url, api_key: String, client: reqwest::Client) -> Sender {
        Sender::Http(HttpSender {
            endpoint,
            api_key,
            client,
        })
    }
}

#[async_trait::async_trait]
impl EmailSender for Sender {
    async fn send(&self, email: NotificationEmail) -> anyhow::Result<()> {
        match self {
            Sender::Disabled => {
                tracing::warn!(
                    to = %email.to_account_id,
                    subject = %email.subject,
                    idempotency_key = %email.idempotency_key,
                    "skipping sending incident email (disabled)"
                );
                Ok(())
            }
            Sender::Http(http) => http.send(email).await,
        }
    }
}
