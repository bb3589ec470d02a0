//! Kodegen Bundler OTA - over-the-air publisher for iOS builds.
//!
//! Publishes an `.ipa` with its install manifest and index page, then bumps
//! the project build number in the repository it was built from.

use kodegen_bundler_ota::cli;
use std::process;

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::init();

    // Run CLI and get exit code
    let exit_code = match cli::run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            cli::EXIT_FAILURE
        }
    };

    process::exit(exit_code);
}
