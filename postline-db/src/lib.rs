pub mod client;
pub mod feed;
pub mod record;
