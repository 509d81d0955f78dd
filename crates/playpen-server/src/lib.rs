//! HTTP host for playpen.
//!
//! This crate exposes a [`Playground`](playpen_pipeline::Playground) and its
//! [`Preview`](playpen_pipeline::Preview) over HTTP:
//!
//! - Editing the pen (source, name) and forcing rebuilds
//! - Sharing, diagnostics and settings
//! - The rendered preview surface and its reset
//! - Health checks
//!
//! # Quick Start
//!
//! ```ignore
//! use playpen_server::{AppState, PlaypenServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let state = AppState::new(playground, preview);
//!     let server = PlaypenServer::new(state, ServerConfig::default());
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod handler;
pub mod response;
pub mod router;
pub mod server;
pub mod state;

pub use server::{PlaypenServer, ServerConfig, TestHandle};
pub use state::AppState;
