#![doc = include_str!("../README.md")]
#![deny(rustdoc::broken_intra_doc_links, rust_2018_idioms)]
#![warn(
    clippy::clone_on_ref_ptr,
    clippy::dbg_macro,
    clippy::explicit_iter_loop,
    clippy::todo,
    clippy::unimplemented,
    clippy::use_self,
    clippy::doc_markdown,
    clippy::print_stdout,
    missing_debug_implementations,
    unused_crate_dependencies,
    unreachable_pub,
    missing_docs
)]

mod error;
pub use error::Error;

mod logging;

mod value;
pub use value::{Table, Value, MAX_KEY_LEN};

mod codec;

mod packet;
pub use packet::{decode, encode, Packet};

mod session;
pub use session::{CommandHandler, Event, Session, SessionConfig};

mod client;
pub use client::Client;

// Unused crate lint workaround: criterion is only exercised by
// benches/bench.rs, not by the lib's own `#[cfg(test)]` modules.
#[cfg(test)]
use criterion as _;
