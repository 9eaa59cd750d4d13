//! BER (Basic Encoding Rules) codec for the SNMP wire format.
//!
//! Encoding uses a reverse buffer so constructed lengths never need to be
//! pre-computed; decoding is bounds-checked and permissive in the same places
//! net-snmp is (non-minimal integers, long-form lengths).

mod decode;
mod encode;
mod length;
pub mod tag;

pub use decode::*;
pub use encode::*;
pub use length::*;
