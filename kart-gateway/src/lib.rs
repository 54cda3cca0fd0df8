//! HTTP adapters for the external providers: the shipping aggregator and the
//! payment gateway.

mod http;
pub mod razorpay;
pub mod shiprocket;

pub use razorpay::RazorpayClient;
pub use shiprocket::ShiprocketClient;
