use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrialError {
    #[error("Data not loaded: {0}")]
    NotLoaded(String),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::XlsxError),

    #[error("Failed to fetch table '{table}': {message}")]
    Source { table: String, message: String },

    #[error("InvalidData: {0}")]
    InvalidData(String),

    #[error("Config: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, TrialError>;

#[cfg(feature = "python")]
impl From<TrialError> for pyo3::PyErr {
    fn from(err: TrialError) -> pyo3::PyErr {
        pyo3::exceptions::PyRuntimeError::new_err(err.to_string())
    }
}
