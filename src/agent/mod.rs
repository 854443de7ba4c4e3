//! Agents: a model client, instructions and tools, driven by the agent loop.

pub mod agent;
pub mod client;

pub use agent::Agent;
pub use client::ModelClient;
