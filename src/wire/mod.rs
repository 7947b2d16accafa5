//! Wire codecs: version-dispatched integer I/O and the ACK frame.

pub mod ack_frame;
pub mod io;

pub use ack_frame::{AckFrame, AckRange};
pub use io::Endianness;
