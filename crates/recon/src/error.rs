use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (empty column name, bad threshold, etc.).
    ConfigValidation(String),
    /// A table or column an analysis cannot run without is absent.
    Configuration(String),
    /// A required column is absent from an input table.
    MissingColumn { table: String, column: String },
    /// Region table parse or validation error.
    RegionTable(String),
    /// IO error (file read, etc.).
    Io(String),
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::Configuration(msg) => write!(f, "configuration error: {msg}"),
            Self::MissingColumn { table, column } => {
                write!(f, "table '{table}' has no column '{column}'")
            }
            Self::RegionTable(msg) => write!(f, "region table error: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for ReconError {}
