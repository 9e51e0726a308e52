use thiserror::Error;

/// Errors raised while loading or validating registry configuration.
///
/// Registry operations themselves are total and never fail; an unknown
/// id or name is a normal negative answer, not an error.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {message}")]
    Config { message: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type RegistryResult<T> = Result<T, Error>;

// エラー作成用のヘルパー関数
impl Error {
    pub fn config<S: Into<String>>(message: S) -> Self {
        Error::Config {
            message: message.into(),
        }
    }
}
