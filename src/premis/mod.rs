//! PREMIS v3 preservation metadata: typed model, XML codec and the
//! append-only assembler operations.

mod assembler;
mod error;
mod model;
mod xml;

pub use assembler::{
    add_agent, add_event_for_each_object, add_object, files_within_directory, load_or_initialize,
    persist,
};
pub use error::PremisError;
pub use model::{Agent, Document, EventSummary};
pub use xml::parse;
