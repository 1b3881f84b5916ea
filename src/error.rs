//! Error types.

use tower_lsp::lsp_types::Url;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A request referenced a document that is not open.
    #[error("document is not open: {0}")]
    UnknownDocument(Url),

    #[error("malformed source map: {0}")]
    SourceMap(String),

    #[error("transpilation failed: {0}")]
    Transpile(String),

    #[error("provider `{name}` failed: {message}")]
    Provider { name: &'static str, message: String },

    #[error("invalid settings: {0}")]
    Settings(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for tower_lsp::jsonrpc::Error {
    fn from(error: Error) -> Self {
        match error {
            Error::UnknownDocument(_) => tower_lsp::jsonrpc::Error::invalid_params(error.to_string()),
            other => {
                let mut rpc = tower_lsp::jsonrpc::Error::internal_error();
                rpc.message = other.to_string().into();
                rpc
            }
        }
    }
}
