use thiserror::Error;

use crate::ids::IdError;

#[derive(Debug, Error)]
pub enum PremisError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("malformed PREMIS document: {0}")]
    Malformed(String),

    #[error(transparent)]
    IdGeneration(#[from] IdError),

    #[error("list SIP files: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("step was abandoned before the document was written")]
    Abandoned,
}

impl PremisError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        PremisError::Malformed(reason.into())
    }
}
