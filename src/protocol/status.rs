//! Device status reports.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ScannerState {
    Initializing = 0,
    Ready = 1,
    Starting = 2,
    Running = 3,
    Stopping = 4,
    Errored = 5,
    SelfTesting = 6,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Status {
    #[prost(message, optional, tag = "1")]
    pub scanner: Option<status::Scanner>,
    #[prost(message, repeated, tag = "2")]
    pub temperatures: Vec<status::Temperature>,
    #[prost(message, optional, tag = "3")]
    pub time_synchronization: Option<status::TimeSynchronization>,
}

pub mod status {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Scanner {
        #[prost(enumeration = "super::ScannerState", optional, tag = "1")]
        pub state: Option<i32>,
        /// Present while the device is in the errored state.
        #[prost(message, optional, tag = "2")]
        pub error: Option<crate::protocol::Error>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Temperature {
        #[prost(string, optional, tag = "1")]
        pub sensor: Option<String>,
        /// Degrees Celsius.
        #[prost(float, optional, tag = "2")]
        pub value: Option<f32>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct TimeSynchronization {
        #[prost(bool, optional, tag = "1")]
        pub synchronized: Option<bool>,
        #[prost(double, optional, tag = "2")]
        pub offset_from_master_s: Option<f64>,
    }
}
