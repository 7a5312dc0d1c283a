//! # mailsift-imap
//!
//! A minimal async IMAP client sized for the mailsift triage daemon.
//!
//! The crate deliberately covers only the protocol surface the daemon
//! exercises: implicit-TLS or plaintext connect, LOGIN, SELECT/EXAMINE,
//! UID SEARCH, UID FETCH (RFC822 and FLAGS), UID STORE, UID MOVE, CREATE,
//! IDLE/DONE (RFC 2177) and LOGOUT. Response handling scrapes exactly the
//! fields those commands need instead of modeling the full grammar.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::time::Duration;
//! use mailsift_imap::Client;
//!
//! #[tokio::main]
//! async fn main() -> mailsift_imap::Result<()> {
//!     let mut client =
//!         Client::connect("imap.example.com", 993, true, Duration::from_secs(10)).await?;
//!     client.login("user@example.com", "password").await?;
//!     client.select("INBOX", true).await?;
//!
//!     let uids = client.uid_search("UNSEEN").await?;
//!     for uid in uids {
//!         if let Some(raw) = client.uid_fetch_message(uid).await? {
//!             println!("{uid}: {} bytes", raw.len());
//!         }
//!     }
//!
//!     // Block until the server reports a change, or 30 seconds pass.
//!     let event = client.idle_wait(Duration::from_secs(30)).await?;
//!     println!("{event:?}");
//!     client.idle_done().await?;
//!     client.logout().await
//! }
//! ```

pub mod client;
mod error;
pub mod framed;
pub mod response;
pub mod stream;
mod tag;
pub mod types;

pub use client::Client;
pub use error::{Error, Result};
pub use stream::ImapStream;
pub use types::{IdleEvent, Uid};
