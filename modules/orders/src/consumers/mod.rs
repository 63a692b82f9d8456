pub mod saga_consumer;
