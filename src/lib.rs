pub mod error;
pub mod network;
pub mod sim;
pub mod timeq;
pub mod traffic;
