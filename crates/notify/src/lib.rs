//! # `hookrelay-notify` - outbound webhook adapter
//!
//! Implements the `WebhookSender` port on top of `reqwest`.

pub mod webhook;
