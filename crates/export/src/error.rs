use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExportError {
    #[error("unknown model '{0}'")]
    UnknownModel(String),

    #[error("association '{association}' of '{model}' targets unknown model '{target}'")]
    UnknownTarget {
        model: String,
        association: String,
        target: String,
    },

    #[error("expected a JSON object for '{0}'")]
    NotAnObject(String),
}
