//! DLT frame discovery and header decoding
//!
//! This module splits a capture stream into frames and decodes the headers
//! of each frame. Payload interpretation lives in [`crate::payload`].

pub mod frame_source;
pub mod header;

// Re-export frame and header types
pub use frame_source::{Frame, FrameSource, ResyncOutcome};
pub use header::{
    ExtendedHeader, FrameHeaders, HeaderDecoder, StandardHeader, StorageHeader,
    STORAGE_HEADER_MARKER,
};
