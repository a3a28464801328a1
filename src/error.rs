use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("cannot load report form: {0}")]
    FormLoad(String),

    #[error("invalid report form: {0}")]
    InvalidForm(String),

    #[error("band cannot fit on an empty page: {0}")]
    Layout(String),

    #[error("font error: {0}")]
    Font(String),

    #[error("report was cancelled")]
    Cancelled,

    #[error("no report has been written; call write() before save()")]
    NothingToSave,

    #[error("no output file or stream has been set")]
    NoOutput,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ReportError>;
