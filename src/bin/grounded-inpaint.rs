//! Object editing CLI binary
//!
//! Command-line interface for text-prompted object replacement using the
//! grounded-inpaint library.

#[cfg(feature = "cli")]
use grounded_inpaint::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
