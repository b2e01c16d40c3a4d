pub mod metadata;

pub use metadata::{ParameterDescriptor, ParameterRange, ToolMetadata, ToolMetadataStore};
