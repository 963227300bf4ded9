//! # Access Control
//!
//! HTTP side of the physical-access-control platform.
//!
//! - [`ArtemisClient`]: signed `POST` calls for person creation, identifier
//!   update and privilege-group membership, with bounded retry
//! - [`HttpPhotoFetcher`]: downloads face photos and base64-encodes them

pub mod client;
pub mod photo;
pub mod requests;

pub use client::ArtemisClient;
pub use photo::HttpPhotoFetcher;
pub use requests::PlatformResponse;
