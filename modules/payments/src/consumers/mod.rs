pub mod reservation_consumer;
