//! Upload receiving: fragment sessions and reassembly.

mod receiver;

pub use receiver::{AssembledUpload, ChunkReceiver, FragmentOutcome, UploadHint};
