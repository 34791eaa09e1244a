pub mod helper;
pub mod http;
pub mod icmp;
pub mod mysql;
pub mod ping;
pub mod scanner;
pub mod socket;
pub mod tls;
pub mod trace;

pub use icmp::EchoCodec;
pub use ping::Pinger;
pub use scanner::Scanner;
pub use socket::{IcmpTransport, RawIcmpSocket};
pub use trace::Tracer;
