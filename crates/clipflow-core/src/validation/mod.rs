//! Validation modules

pub mod upload;

pub use upload::{
    encode_file_name, sanitize_stem, split_title_extension, validate_upload, EncodedName,
    UploadLimits, ValidationError,
};
