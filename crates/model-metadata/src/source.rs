//! Collaborators consulted while building model metadata

use tensor_pipeline::TensorSpec;

use crate::MetadataError;

/// Describes the tensors of a loaded model
pub trait TensorIntrospection {
    fn input_tensor(&self, index: usize) -> Result<TensorSpec, MetadataError>;

    fn output_tensor(&self, index: usize) -> Result<TensorSpec, MetadataError>;
}

/// Resolves files referenced by the metadata
pub trait AssociatedFiles {
    fn load_associated_file(&self, name: &str) -> Result<Vec<u8>, MetadataError>;
}

impl<T: TensorIntrospection + ?Sized> TensorIntrospection for &T {
    fn input_tensor(&self, index: usize) -> Result<TensorSpec, MetadataError> {
        (**self).input_tensor(index)
    }

    fn output_tensor(&self, index: usize) -> Result<TensorSpec, MetadataError> {
        (**self).output_tensor(index)
    }
}
