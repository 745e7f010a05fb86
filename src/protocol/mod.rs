//! Wire contract spoken with the device.
//!
//! Every frame on the socket carries exactly one [`Request`] (client to device)
//! or one [`Response`] (device to client). Once a subscription is active the
//! device also pushes responses carrying an [`Event`].
//!
//! The messages are maintained by hand with `prost` derives so the crate builds
//! without a protobuf compiler. Field numbers are part of the contract and must
//! never be reused.

pub mod config;
pub mod data;
mod error;
pub mod file;
pub mod status;

pub use config::{Advanced, FrameMode, NamedScanPattern, ScanPattern, TimeSynchronization};
pub use data::{Frame, Imu, Point, Scanline};
pub use error::{Error, error as error_kind};
pub use status::{ScannerState, Status};

/// Protocol revision implemented by this crate; sent in every `hello`.
pub const PROTOCOL_VERSION: u32 = 1;

/// Identity block the device attaches to point-cloud subscriptions.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeviceHeader {
    #[prost(string, optional, tag = "1")]
    pub serial_number: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub firmware_version: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub hardware_variant: Option<String>,
    #[prost(uint32, optional, tag = "4")]
    pub protocol_version: Option<u32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Request {
    #[prost(
        oneof = "request::Data",
        tags = "11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25"
    )]
    pub data: Option<request::Data>,
}

pub mod request {
    use super::{Advanced, Frame, ScanPattern, TimeSynchronization, config::scan_pattern::Filter};

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Hello {
        #[prost(uint32, optional, tag = "1")]
        pub protocol_version: Option<u32>,
        #[prost(string, optional, tag = "2")]
        pub library_version: Option<String>,
        #[prost(enumeration = "super::file::Language", optional, tag = "3")]
        pub language: Option<i32>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Subscribe {
        #[prost(oneof = "subscribe::Kind", tags = "1, 2, 3")]
        pub kind: Option<subscribe::Kind>,
    }

    pub mod subscribe {
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct PointCloud {
            /// Template whose populated fields select what the device sends.
            #[prost(message, optional, tag = "1")]
            pub reference_frame: Option<super::Frame>,
            #[prost(message, optional, tag = "2")]
            pub filter: Option<super::Filter>,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct Status {}

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct Imu {
            #[prost(bool, optional, tag = "1")]
            pub packed_format: Option<bool>,
        }

        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum Kind {
            #[prost(message, tag = "1")]
            PointCloud(PointCloud),
            #[prost(message, tag = "2")]
            Status(Status),
            #[prost(message, tag = "3")]
            Imu(Imu),
        }
    }

    /// Payload-free requests.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Query {}

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SetScanPattern {
        #[prost(message, optional, tag = "1")]
        pub config: Option<ScanPattern>,
        #[prost(bool, optional, tag = "2")]
        pub persist: Option<bool>,
        /// Activates a stored pattern instead of `config`.
        #[prost(string, optional, tag = "3")]
        pub name: Option<String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct FillScanPattern {
        #[prost(message, optional, tag = "1")]
        pub config: Option<ScanPattern>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SetAdvancedConfig {
        #[prost(message, optional, tag = "1")]
        pub config: Option<Advanced>,
        #[prost(bool, optional, tag = "2")]
        pub persist: Option<bool>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct StoreNamedScanPattern {
        #[prost(string, optional, tag = "1")]
        pub name: Option<String>,
        #[prost(message, optional, tag = "2")]
        pub config: Option<ScanPattern>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct DeleteNamedScanPattern {
        #[prost(string, optional, tag = "1")]
        pub name: Option<String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SetTimeSynchronization {
        #[prost(message, optional, tag = "1")]
        pub config: Option<TimeSynchronization>,
        #[prost(bool, optional, tag = "2")]
        pub persist: Option<bool>,
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Data {
        #[prost(message, tag = "11")]
        Hello(Hello),
        #[prost(message, tag = "12")]
        Subscribe(Subscribe),
        #[prost(message, tag = "13")]
        Unsubscribe(Subscribe),
        #[prost(message, tag = "14")]
        Status(Query),
        #[prost(message, tag = "15")]
        SetScanPattern(SetScanPattern),
        #[prost(message, tag = "16")]
        FillScanPattern(FillScanPattern),
        #[prost(message, tag = "17")]
        GetScanPattern(Query),
        #[prost(message, tag = "18")]
        GetAdvancedConfig(Query),
        #[prost(message, tag = "19")]
        SetAdvancedConfig(SetAdvancedConfig),
        #[prost(message, tag = "20")]
        GetNamedScanPatterns(Query),
        #[prost(message, tag = "21")]
        StoreNamedScanPattern(StoreNamedScanPattern),
        #[prost(message, tag = "22")]
        DeleteNamedScanPattern(DeleteNamedScanPattern),
        #[prost(message, tag = "23")]
        SetTimeSynchronization(SetTimeSynchronization),
        #[prost(message, tag = "24")]
        RunSelfTest(Query),
        #[prost(message, tag = "25")]
        AttemptErrorRecovery(Query),
    }

    impl Data {
        /// Name of the request, as used in logs and errors.
        pub fn name(&self) -> &'static str {
            match self {
                Data::Hello(_) => "hello",
                Data::Subscribe(_) => "subscribe",
                Data::Unsubscribe(_) => "unsubscribe",
                Data::Status(_) => "status",
                Data::SetScanPattern(_) => "set_scan_pattern",
                Data::FillScanPattern(_) => "fill_scan_pattern",
                Data::GetScanPattern(_) => "get_scan_pattern",
                Data::GetAdvancedConfig(_) => "get_advanced_config",
                Data::SetAdvancedConfig(_) => "set_advanced_config",
                Data::GetNamedScanPatterns(_) => "get_named_scan_patterns",
                Data::StoreNamedScanPattern(_) => "store_named_scan_pattern",
                Data::DeleteNamedScanPattern(_) => "delete_named_scan_pattern",
                Data::SetTimeSynchronization(_) => "set_time_synchronization",
                Data::RunSelfTest(_) => "run_self_test",
                Data::AttemptErrorRecovery(_) => "attempt_error_recovery",
            }
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Response {
    #[prost(
        oneof = "response::Data",
        tags = "1, 2, 11, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25"
    )]
    pub data: Option<response::Data>,
    /// Device clock when the response was sent.
    #[prost(uint64, optional, tag = "3")]
    pub timestamp_ns: Option<u64>,
}

pub mod response {
    use super::{Advanced, Event, NamedScanPattern, ScanPattern, Status};

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Hello {
        #[prost(uint32, optional, tag = "1")]
        pub protocol_version: Option<u32>,
        #[prost(string, optional, tag = "2")]
        pub library_version: Option<String>,
        #[prost(string, optional, tag = "3")]
        pub serial_number: Option<String>,
    }

    /// Acknowledges a request that returns nothing.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Ack {}

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct NamedScanPatterns {
        #[prost(message, repeated, tag = "1")]
        pub configs: Vec<NamedScanPattern>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct RunSelfTest {
        #[prost(bool, optional, tag = "1")]
        pub success: Option<bool>,
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Data {
        #[prost(message, tag = "1")]
        Error(super::Error),
        #[prost(message, tag = "2")]
        Event(Event),
        #[prost(message, tag = "11")]
        Hello(Hello),
        #[prost(message, tag = "13")]
        Unsubscribe(Ack),
        #[prost(message, tag = "14")]
        Status(Status),
        #[prost(message, tag = "15")]
        SetScanPattern(Ack),
        #[prost(message, tag = "16")]
        FillScanPattern(ScanPattern),
        #[prost(message, tag = "17")]
        GetScanPattern(ScanPattern),
        #[prost(message, tag = "18")]
        GetAdvancedConfig(Advanced),
        #[prost(message, tag = "19")]
        SetAdvancedConfig(Ack),
        #[prost(message, tag = "20")]
        GetNamedScanPatterns(NamedScanPatterns),
        #[prost(message, tag = "21")]
        StoreNamedScanPattern(Ack),
        #[prost(message, tag = "22")]
        DeleteNamedScanPattern(Ack),
        #[prost(message, tag = "23")]
        SetTimeSynchronization(Ack),
        #[prost(message, tag = "24")]
        RunSelfTest(RunSelfTest),
        #[prost(message, tag = "25")]
        AttemptErrorRecovery(Ack),
    }

    impl Data {
        /// Name of the response branch, as used in logs and errors.
        pub fn name(&self) -> &'static str {
            match self {
                Data::Error(_) => "error",
                Data::Event(_) => "event",
                Data::Hello(_) => "hello",
                Data::Unsubscribe(_) => "unsubscribe",
                Data::Status(_) => "status",
                Data::SetScanPattern(_) => "set_scan_pattern",
                Data::FillScanPattern(_) => "fill_scan_pattern",
                Data::GetScanPattern(_) => "get_scan_pattern",
                Data::GetAdvancedConfig(_) => "get_advanced_config",
                Data::SetAdvancedConfig(_) => "set_advanced_config",
                Data::GetNamedScanPatterns(_) => "get_named_scan_patterns",
                Data::StoreNamedScanPattern(_) => "store_named_scan_pattern",
                Data::DeleteNamedScanPattern(_) => "delete_named_scan_pattern",
                Data::SetTimeSynchronization(_) => "set_time_synchronization",
                Data::RunSelfTest(_) => "run_self_test",
                Data::AttemptErrorRecovery(_) => "attempt_error_recovery",
            }
        }
    }
}

/// Data pushed by the device for an active subscription.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Event {
    #[prost(oneof = "event::Data", tags = "1, 2, 3")]
    pub data: Option<event::Data>,
}

pub mod event {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct PointCloud {
        /// Sent once, in reply to the subscribe request.
        #[prost(message, optional, tag = "1")]
        pub header: Option<super::DeviceHeader>,
        #[prost(message, optional, tag = "2")]
        pub frame: Option<super::Frame>,
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Data {
        #[prost(message, tag = "1")]
        PointCloud(PointCloud),
        #[prost(message, tag = "2")]
        Status(super::Status),
        #[prost(message, tag = "3")]
        Imu(super::Imu),
    }
}

impl From<request::Data> for Request {
    fn from(data: request::Data) -> Self {
        Self { data: Some(data) }
    }
}

impl From<response::Data> for Response {
    fn from(data: response::Data) -> Self {
        Self { data: Some(data), timestamp_ns: None }
    }
}

impl Response {
    /// Returns the pushed event, if this response carries one with data.
    pub fn event(&self) -> Option<&event::Data> {
        match &self.data {
            Some(response::Data::Event(event)) => event.data.as_ref(),
            _ => None,
        }
    }

    pub fn into_event(self) -> Option<event::Data> {
        match self.data {
            Some(response::Data::Event(event)) => event.data,
            _ => None,
        }
    }

    /// Name of the populated branch, or `"empty"`.
    pub fn kind_name(&self) -> &'static str {
        self.data.as_ref().map(response::Data::name).unwrap_or("empty")
    }
}
