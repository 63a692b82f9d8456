pub mod config;
pub mod consumers;
pub mod health;
pub mod mailer;

pub use consumers::payment_consumer::{PaymentEventsConsumer, PAYMENT_EVENTS_QUEUE};
pub use mailer::{render_confirmation, Mailer};
