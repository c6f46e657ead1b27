//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract: scripts rely on them.
//!
//! # Exit Codes
//!
//! | Code | Description                                        |
//! |------|----------------------------------------------------|
//! | 0    | Success                                            |
//! | 1    | General error (unspecified)                        |
//! | 2    | CLI usage error (bad args, no config given)        |
//! | 3    | Invalid run config, settings or region table       |
//! | 4    | Runtime error (unreadable or unusable input table) |
//! | 5    | Analysis produced warnings and `--strict` was set  |
//! | 6    | Access key missing or rejected                     |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
/// clap exits with the same code on parse errors.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Analysis (3-6)
// =============================================================================

/// Run config, settings file or region table failed to parse or validate.
pub const EXIT_CONFIG: u8 = 3;

/// An input table could not be read, or lacks what the command needs.
pub const EXIT_RUNTIME: u8 = 4;

/// `--strict` and at least one section warned or failed.
pub const EXIT_WARNINGS: u8 = 5;

/// An access key digest is configured and the supplied key did not match.
pub const EXIT_ACCESS_DENIED: u8 = 6;
