//! Messages stored in `.bfpc` recordings.

use super::config::ScanPattern;
use super::data::Frame;
use super::DeviceHeader;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Language {
    Unspecified = 0,
    Cpp = 1,
    Python = 2,
    Typescript = 3,
    Rust = 4,
}

/// First message of every recording.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Header {
    #[prost(message, optional, tag = "1")]
    pub device: Option<DeviceHeader>,
    #[prost(message, optional, tag = "2")]
    pub client: Option<header::Client>,
}

pub mod header {
    /// Provenance of the recording. Never affects decoding.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Client {
        #[prost(string, optional, tag = "1")]
        pub library_version: Option<String>,
        #[prost(uint64, optional, tag = "2")]
        pub file_time_ns: Option<u64>,
        #[prost(enumeration = "super::Language", optional, tag = "3")]
        pub language: Option<i32>,
    }
}

/// Trailing summary of a recording.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Footer {
    #[prost(message, repeated, tag = "1")]
    pub events: Vec<footer::Event>,
    #[prost(message, optional, tag = "2")]
    pub stats: Option<footer::Stats>,
}

pub mod footer {
    /// The scan pattern in effect from `from_frame_id` on.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Event {
        #[prost(uint64, optional, tag = "1")]
        pub from_frame_id: Option<u64>,
        #[prost(message, optional, tag = "2")]
        pub scan_pattern: Option<super::ScanPattern>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Stats {
        #[prost(uint64, optional, tag = "1")]
        pub frames: Option<u64>,
        #[prost(uint64, optional, tag = "2")]
        pub points: Option<u64>,
        #[prost(uint64, optional, tag = "3")]
        pub returns: Option<u64>,
    }
}

/// Envelope for every message after the header: a frame, or the footer last.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Data {
    #[prost(oneof = "data::Kind", tags = "1, 2")]
    pub kind: Option<data::Kind>,
}

pub mod data {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Kind {
        #[prost(message, tag = "1")]
        Frame(super::Frame),
        #[prost(message, tag = "2")]
        Footer(super::Footer),
    }
}

/// Header and footer of a recording, as known to a reader or recorder.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Metadata {
    #[prost(message, optional, tag = "1")]
    pub header: Option<Header>,
    #[prost(message, optional, tag = "2")]
    pub footer: Option<Footer>,
}

impl Data {
    pub fn frame(frame: Frame) -> Self {
        Self { kind: Some(data::Kind::Frame(frame)) }
    }

    pub fn footer(footer: Footer) -> Self {
        Self { kind: Some(data::Kind::Footer(footer)) }
    }

    pub fn is_footer(&self) -> bool {
        matches!(self.kind, Some(data::Kind::Footer(_)))
    }
}
