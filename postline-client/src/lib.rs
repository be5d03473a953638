pub mod channel;
pub mod detail;
pub mod error;
pub mod notifications;
pub mod resolver;
pub mod session;
pub mod store;

#[cfg(test)]
mod testing;
