pub mod client;
pub mod models;
pub mod requests;

pub use client::ReqwestHttpClient;
