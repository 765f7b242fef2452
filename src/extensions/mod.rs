//! Built-in protocol extensions.

mod eight_bit_mime;
mod pipelining;
mod starttls;
mod xforward;

pub use eight_bit_mime::EightBitMime;
pub use pipelining::Pipelining;
pub use starttls::StartTls;
pub use xforward::Xforward;
