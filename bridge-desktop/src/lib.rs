//! # Desktop Bridge Implementations
//!
//! Default bridge adapters for desktop hosts (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! Only the network side is provided here: [`ReqwestHttpClient`] implements
//! `HttpClient` for the MediaBrowser provider. The player surface is always
//! host-specific (libmpv, libVLC, AVPlayer) and is not shipped by this crate.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::ReqwestHttpClient;
//! use std::sync::Arc;
//!
//! let http = Arc::new(ReqwestHttpClient::new()?);
//! let service = MediaBrowserConnector::new(server_url, token, device_id, http);
//! ```

mod http;

pub use http::ReqwestHttpClient;
