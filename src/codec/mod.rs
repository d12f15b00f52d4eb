//! Codec bridge: μ-law re-framing between the telephony and model sockets.

pub mod framer;
pub mod mulaw;

pub use framer::{Framer, FRAME_BYTES};
