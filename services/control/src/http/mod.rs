pub mod health;
pub mod response;
pub mod sessions;
pub mod streaming_servers;
