//! Recording controller
//!
//! This module provides the recording flow for one interview session:
//! - An explicit finite-state machine with named states and a claimable
//!   finalize guard
//! - An async driver owning the capture handle, timers, and chunk uploads
//! - The capture device boundary and its fixed constraint policy

mod capture;
mod driver;
mod machine;

pub use capture::{
    CaptureConstraints, CaptureDevice, CaptureStream, MediaChunk, SyntheticCapture,
};
pub use driver::RecordingController;
pub use machine::{AdvanceClaim, AdvanceTrigger, Machine, Phase};
