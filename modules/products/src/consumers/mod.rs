pub mod order_consumer;
