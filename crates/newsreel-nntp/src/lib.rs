//! Asynchronous NNTP (Network News Transfer Protocol) client.
//!
//! Covers the reader side of the protocol:
//! - Greeting and QUIT ([RFC 3977 §5.1](https://datatracker.ietf.org/doc/html/rfc3977#section-5.1))
//! - AUTHINFO USER/PASS ([RFC 4643 §2.3](https://datatracker.ietf.org/doc/html/rfc4643#section-2.3))
//! - LIST ACTIVE, GROUP, ARTICLE, HEAD, BODY ([RFC 3977 §6-7](https://datatracker.ietf.org/doc/html/rfc3977#section-6))
//! - Overview retrieval via LIST OVERVIEW.FMT and XOVER ([RFC 2980 §2.8](https://datatracker.ietf.org/doc/html/rfc2980#section-2.8)),
//!   plus the zlib-compressed XZVER variant
//! - POST with dot-stuffing ([RFC 3977 §6.3.1](https://datatracker.ietf.org/doc/html/rfc3977#section-6.3.1))
//! - Implicit TLS on port 563 ([RFC 4642](https://datatracker.ietf.org/doc/html/rfc4642))

mod dot;
mod error;
mod inflate;
mod model;
mod overview;
pub mod parse;
mod protocol;
mod session;
pub mod tls;

pub use crate::dot::{DotReader, write_dot_block};
pub use crate::error::NntpError;
pub use crate::inflate::ZlibReader;
pub use crate::model::{
    Expect, Group, HeaderMap, MultilineResponse, NntpResponse, Overview, PostingStatus,
};
pub use crate::overview::{Column, OVERVIEW_CHANNEL_CAPACITY, OverviewFormat, OverviewStream};
pub use crate::protocol::{NntpConnection, NntpIo};
pub use crate::session::{Article, Session};
pub use crate::tls::{build_tls_config, connect_tls};
