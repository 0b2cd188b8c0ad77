#![deny(
    missing_copy_implementations,
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts
)]

//! Request and response adapters over an ASGI-style gateway protocol.
//!
//! The gateway hands over a [`Scope`] describing the request plus something
//! to [`Receive`] body chunks from; the application answers by rendering a
//! [`Response`] into something that can [`Transmit`] the outbound messages.

pub mod domain;
pub mod server_impl;

pub use domain::cookie::{CookieOptions, Expires, SameSite, SAMESITE_VALUES};
pub use domain::errors::{AdapterError, AdapterResult};
pub use domain::params::MultiParams;
pub use server_impl::channel::{
    FnReceive, FnTransmit, MessageKind, NoReceive, Receive, ReceiveMessage, SendMessage, Transmit,
};
pub use server_impl::request::Request;
pub use server_impl::response::Response;
pub use server_impl::scope::{Scope, UrlRoute};

pub type AnyResult<T> = eyre::Result<T>;

/// Insertion-ordered map hashed with FNV.
pub type FnvIndexMap<K, V> = indexmap::IndexMap<K, V, fnv::FnvBuildHasher>;

pub const DEFAULT_CONTENT_TYPE: &str = "text/plain";
pub const DEFAULT_SCHEME: &str = "http";
pub const DEFAULT_HOST: &str = "localhost";
