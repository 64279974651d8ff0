//! Overlay CLI - simulated moving-map loop and METAR tools.
//!
//! Binaries:
//! - overlay_run: drives an overlay session from the flight simulator
//! - decode_metar: decodes raw METAR reports to JSON

pub mod config;
pub mod runtime;
pub mod sim;

pub use config::Config;
pub use runtime::{run_overlay_loop, FeedKind, FeedUpdate, OverlayRuntime, RunOptions};
pub use sim::FlightSimulator;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the fmt subscriber, honouring `RUST_LOG` on top of `directive`.
pub fn init_tracing(directive: &str) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(directive.parse()?))
        .try_init()?;
    Ok(())
}
