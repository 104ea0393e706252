//! Model Metadata
//!
//! Reads the metadata payload packaged with a model and combines it with the
//! tensor descriptions reported by the inference engine:
//! - Input tensor spec and its normalization constants
//! - Output tensor spec and its ordered label list
//! - Default input/output pipelines derived from both

mod error;
mod labels;
mod schema;
mod source;
mod view;

pub use error::MetadataError;
pub use labels::load_labels;
pub use schema::{
    decode_f32s, encode_f32s, AssociatedFile, AssociatedFileKind, MetadataPayload, ProcessUnit,
    SubgraphMetadata, TensorMetadata,
};
pub use source::{AssociatedFiles, TensorIntrospection};
pub use view::{MetadataView, ModelMetadata};
