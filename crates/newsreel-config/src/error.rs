use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("syntax error on line {line}: {message}")]
    SyntaxError { line: usize, message: String },

    #[error("unknown variable: ${0}")]
    UnknownVariable(String),

    #[error("unterminated variable reference: {0}")]
    UnterminatedVariable(String),

    #[error("invalid value for {option}: {value}")]
    InvalidValue { option: String, value: String },

    #[error("invalid override '{0}': expected KEY=VALUE")]
    InvalidOverride(String),

    #[error("missing required option: {0}")]
    MissingRequired(String),

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
