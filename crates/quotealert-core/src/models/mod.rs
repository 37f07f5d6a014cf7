//! Data models for QuoteAlert

mod alert;
mod notification;
mod quote;

pub use alert::*;
pub use notification::*;
pub use quote::*;
