pub mod payment_consumer;
