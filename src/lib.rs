//! Tessera: an agent execution and stream normalization engine.
//!
//! A canonical message model with per-role invariants, a provider adapter
//! for the OpenAI Responses protocol, a stream normalizer that turns raw
//! server events into eleven well-defined event kinds, and an agent loop
//! that runs tools until the model answers.
//!
//! # Quick Start
//!
//! ```no_run
//! use tessera::prelude::*;
//! use tessera::tools::ToolParameters;
//!
//! # async fn example() -> tessera::error::Result<()> {
//! let weather = Tool::new_sync(
//!     "get_weather",
//!     "Current weather for a city",
//!     ToolParameters::object().string("location", "City name", true).build(),
//!     |args, _ctx| Ok(format!("22C in {}", args.get_str("location")?).into()),
//! );
//!
//! let agent = Agent::new(ModelClient::openai_from_env()?)
//!     .with_system_instruction("Answer briefly.")
//!     .with_tool(weather)?;
//!
//! let result = agent.run("What's the weather in Paris?").await?;
//! println!("{}", result.output);
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - `openai` (default): the OpenAI Responses adapter and stream normalizer.
//! - `http` (default): the reqwest-backed [`provider::http::HttpTransport`].

pub mod agent;
pub mod agent_loop;
pub mod config;
pub mod error;
pub mod prelude;
pub mod provider;
pub mod tools;
pub mod types;
pub mod util;
