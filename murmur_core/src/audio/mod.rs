pub mod decoder;
pub mod mfcc;

pub use decoder::{cut_window, decode_to_f32_mono, probe_duration};
pub use mfcc::MfccExtractor;
