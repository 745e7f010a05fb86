//! Structured error envelope sent by the device.
//!
//! Field numbers double as the error number reported to users.

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Error {
    #[prost(
        oneof = "error::Kind",
        tags = "1, 2, 3, 4, 5, 6, 11, 12, 13, 14, 15, 16, 17, 18, 21, 22, 23, 24, 25"
    )]
    pub kind: Option<error::Kind>,
}

pub mod error {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Unknown {
        #[prost(string, optional, tag = "1")]
        pub description: Option<String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct NotImplemented {
        #[prost(string, optional, tag = "1")]
        pub reason: Option<String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct InvalidRequest {
        #[prost(string, optional, tag = "1")]
        pub validation_error: Option<String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct OutdatedProtocol {
        #[prost(uint32, optional, tag = "1")]
        pub required_version: Option<u32>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct UnknownErrorCode {
        #[prost(uint32, optional, tag = "1")]
        pub error_code: Option<u32>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct NotInRange {
        #[prost(string, optional, tag = "1")]
        pub parameter: Option<String>,
        #[prost(float, optional, tag = "2")]
        pub minimum: Option<f32>,
        #[prost(float, optional, tag = "3")]
        pub maximum: Option<f32>,
        #[prost(float, optional, tag = "4")]
        pub requested: Option<f32>,
        #[prost(string, optional, tag = "5")]
        pub unit: Option<String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct TimeSyncFailed {
        #[prost(string, optional, tag = "1")]
        pub ntp_daemon_log: Option<String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct NotSupported {
        #[prost(string, optional, tag = "1")]
        pub reason: Option<String>,
    }

    /// Payload-free error branches.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Marker {}

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Kind {
        #[prost(message, tag = "1")]
        Unknown(Unknown),
        #[prost(message, tag = "2")]
        NotImplemented(NotImplemented),
        #[prost(message, tag = "3")]
        Empty(Marker),
        #[prost(message, tag = "4")]
        ServerImplementation(Marker),
        #[prost(message, tag = "5")]
        InvalidRequest(InvalidRequest),
        #[prost(message, tag = "6")]
        ConnectionClosed(Marker),
        #[prost(message, tag = "11")]
        OutdatedServerProtocol(OutdatedProtocol),
        #[prost(message, tag = "12")]
        OutdatedClientProtocol(OutdatedProtocol),
        #[prost(message, tag = "13")]
        ScannerBusy(Marker),
        #[prost(message, tag = "14")]
        WrongOperationMode(Marker),
        #[prost(message, tag = "15")]
        NotAllowed(Marker),
        #[prost(message, tag = "16")]
        HardwareError(Marker),
        #[prost(message, tag = "17")]
        SystemStop(Marker),
        #[prost(message, tag = "18")]
        NotFound(Marker),
        #[prost(message, tag = "21")]
        UnknownErrorCode(UnknownErrorCode),
        #[prost(message, tag = "22")]
        NotInRange(NotInRange),
        #[prost(message, tag = "23")]
        TimeSyncFailed(TimeSyncFailed),
        #[prost(message, tag = "24")]
        NoDeviceDiscovered(Marker),
        #[prost(message, tag = "25")]
        NotSupported(NotSupported),
    }
}
