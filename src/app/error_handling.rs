//! Error handling utilities
//!
//! This module provides centralized error handling for the application.

use crate::error::AggregateError;
use tracing::error;

/// Exit code for errors that carry no classification
const GENERAL_ERROR: i32 = 1;

/// Exit code for an error, classified when it is an `AggregateError`
pub fn exit_code_for(error: &anyhow::Error) -> i32 {
    error
        .downcast_ref::<AggregateError>()
        .map(AggregateError::exit_code)
        .unwrap_or(GENERAL_ERROR)
}

/// Handle fatal errors and exit with appropriate status code
///
/// - `verbose = 0`: user-facing message only
/// - `verbose >= 1`: adds the full cause chain
pub fn handle_fatal_error(error: anyhow::Error, verbose: u8) -> ! {
    error!("Fatal error: {}", error);

    match error.downcast_ref::<AggregateError>() {
        Some(err) => eprintln!("{}", err.user_message()),
        None => eprintln!("Error: {error}"),
    }

    if verbose >= 1 {
        eprintln!("\nError chain:");
        for (i, cause) in error.chain().enumerate() {
            eprintln!("  {}: {}", i, cause);
        }
    }

    std::process::exit(exit_code_for(&error))
}
