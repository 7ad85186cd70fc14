use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("config error: {0}")]
    Config(String),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}
