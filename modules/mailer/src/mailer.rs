//! SMTP delivery of order confirmations.
//!
//! Plain-text mail over an unauthenticated local relay (MailHog in dev).
//! The recipient is a configured placeholder; a user-service lookup would
//! slot in here.

use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("failed to build message: {0}")]
    Build(String),

    #[error("failed to send mail: {0}")]
    Send(String),
}

/// Render the confirmation subject and body for a paid order.
pub fn render_confirmation(order_uuid: &str, amount: i64, currency: &str) -> (String, String) {
    let subject = format!("Order Confirmation {}", order_uuid);
    let body = format!(
        "Thank you for your order!\r\n\
         Order ID: {}\r\n\
         Total: {} {}\r\n",
        order_uuid, amount, currency
    );
    (subject, body)
}

#[derive(Clone)]
pub struct Mailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
    to: String,
}

impl Mailer {
    pub fn new(smtp_host: &str, smtp_port: u16, from: String, to: String) -> Self {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host)
            .port(smtp_port)
            .build();

        Self {
            transport,
            from,
            to,
        }
    }

    pub async fn send_order_confirmation(
        &self,
        order_uuid: &str,
        amount: i64,
        currency: &str,
    ) -> Result<(), MailError> {
        let (subject, body) = render_confirmation(order_uuid, amount, currency);

        let message = Message::builder()
            .from(self.from.parse().map_err(|e| MailError::Build(format!("from: {}", e)))?)
            .to(self.to.parse().map_err(|e| MailError::Build(format!("to: {}", e)))?)
            .subject(subject)
            .body(body)
            .map_err(|e| MailError::Build(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Send(e.to_string()))?;

        Ok(())
    }
}
