/// Error code registry for csvagg
///
/// Error codes are organized by category:
/// - 1000-1999: Configuration errors
/// - 2000-2999: Input errors
/// - 3000-3999: Execution errors
/// - 4000-4999: Output errors
pub struct ErrorCode;

impl ErrorCode {
    // Configuration errors (1000-1999)
    pub const CONFIG_INVALID_VALUE: u16 = 1001;
    pub const CONFIG_PARSE_ERROR: u16 = 1002;
    pub const CONFIG_NOT_READABLE: u16 = 1003;

    // Input errors (2000-2999)
    pub const INPUT_MISSING_COLUMN: u16 = 2001;
    pub const INPUT_EMPTY: u16 = 2002;
    pub const INPUT_OPEN_FAILED: u16 = 2003;
    pub const INPUT_READ_FAILED: u16 = 2004;

    // Execution errors (3000-3999)
    pub const EXEC_BATCH_FAULT: u16 = 3001;
    pub const EXEC_SHUTDOWN_TIMEOUT: u16 = 3002;

    // Output errors (4000-4999)
    pub const OUTPUT_WRITE_FAILED: u16 = 4001;
}

/// Get a human-readable description for an error code
pub fn describe_error_code(code: u16) -> &'static str {
    match code {
        1001 => "Invalid value in configuration",
        1002 => "Failed to parse configuration file",
        1003 => "Configuration file could not be read",

        2001 => "Required column missing from header",
        2002 => "Input contains no header line",
        2003 => "Input file could not be opened",
        2004 => "Input file could not be read",

        3001 => "Batch reduction failed",
        3002 => "Worker pool did not terminate in time",

        4001 => "Report could not be written",

        _ => "Unknown error code",
    }
}
