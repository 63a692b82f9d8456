pub mod cart_client;
