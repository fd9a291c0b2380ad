//! Encoder catalog and capability discovery.

pub mod catalog;
pub mod device;
pub mod help_text;
pub mod scanner;

pub use catalog::{Backend, Codec, EncoderDescriptor, ENCODERS};
pub use device::DeviceChoice;
pub use scanner::{CapabilityScanner, EncoderCapability, ScannerConfig};
