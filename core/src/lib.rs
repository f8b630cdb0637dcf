//! Agent Relay Core Library
//! Path gating, payload translation and stream re-framing between a chat UI and an agent backend

pub mod config;
pub mod proxy;
