//! Device configuration messages.

use super::data::Frame;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum FrameMode {
    CombineUpDown = 0,
    OnlyUp = 1,
    OnlyDown = 2,
    Separate = 3,
}

/// Describes how the mirror sweeps and how fast frames are produced.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ScanPattern {
    #[prost(message, optional, tag = "1")]
    pub horizontal: Option<scan_pattern::Horizontal>,
    #[prost(message, optional, tag = "2")]
    pub vertical: Option<scan_pattern::Vertical>,
    #[prost(message, optional, tag = "3")]
    pub pulse: Option<scan_pattern::Pulse>,
    #[prost(message, optional, tag = "4")]
    pub frame_rate: Option<scan_pattern::FrameRate>,
    #[prost(message, optional, tag = "5")]
    pub filter: Option<scan_pattern::Filter>,
}

pub mod scan_pattern {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Horizontal {
        /// Degrees.
        #[prost(float, optional, tag = "1")]
        pub fov: Option<f32>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Vertical {
        /// Degrees.
        #[prost(float, optional, tag = "1")]
        pub fov: Option<f32>,
        #[prost(uint32, optional, tag = "2")]
        pub scanlines_up: Option<u32>,
        #[prost(uint32, optional, tag = "3")]
        pub scanlines_down: Option<u32>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Pulse {
        #[prost(float, optional, tag = "1")]
        pub angle_spacing: Option<f32>,
        #[prost(enumeration = "super::FrameMode", optional, tag = "2")]
        pub frame_mode: Option<i32>,
        #[prost(bool, optional, tag = "3")]
        pub distortion_correction: Option<bool>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct FrameRate {
        #[prost(double, optional, tag = "1")]
        pub target: Option<f64>,
        /// Filled in by the device for the current pattern.
        #[prost(double, optional, tag = "2")]
        pub maximum: Option<f64>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Filter {
        #[prost(uint32, optional, tag = "1")]
        pub max_number_of_returns_per_point: Option<u32>,
        #[prost(message, optional, tag = "2")]
        pub intensity: Option<super::ValueRange>,
        #[prost(message, optional, tag = "3")]
        pub ambient_light_level: Option<super::ValueRange>,
        #[prost(message, optional, tag = "4")]
        pub range: Option<super::ValueRange>,
        #[prost(bool, optional, tag = "5")]
        pub delete_points_without_returns: Option<bool>,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ValueRange {
    #[prost(float, optional, tag = "1")]
    pub minimum: Option<f32>,
    #[prost(float, optional, tag = "2")]
    pub maximum: Option<f32>,
}

/// Scan pattern stored on the device under a name.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NamedScanPattern {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    #[prost(message, optional, tag = "2")]
    pub config: Option<ScanPattern>,
    #[prost(bool, optional, tag = "3")]
    pub read_only: Option<bool>,
}

/// Expert settings. Changing them can degrade the device; most users never need them.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Advanced {
    #[prost(message, optional, tag = "1")]
    pub processing: Option<advanced::Processing>,
    #[prost(message, optional, tag = "2")]
    pub server: Option<advanced::Server>,
}

pub mod advanced {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Processing {
        /// Meters added to every range.
        #[prost(float, optional, tag = "1")]
        pub range_offset: Option<f32>,
        #[prost(float, repeated, tag = "2")]
        pub imu_static_rotation_offset: Vec<f32>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Server {
        #[prost(message, optional, tag = "1")]
        pub default_point_cloud_subscription: Option<super::Frame>,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TimeSynchronization {
    #[prost(oneof = "time_synchronization::Kind", tags = "1, 2")]
    pub kind: Option<time_synchronization::Kind>,
}

pub mod time_synchronization {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Ntp {
        #[prost(string, repeated, tag = "1")]
        pub servers: Vec<String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Ptp {
        #[prost(uint32, optional, tag = "1")]
        pub domain: Option<u32>,
        #[prost(string, repeated, tag = "2")]
        pub unicast_destinations: Vec<String>,
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Kind {
        #[prost(message, tag = "1")]
        Ntp(Ntp),
        #[prost(message, tag = "2")]
        Ptp(Ptp),
    }
}

impl ScanPattern {
    /// Maximum frame rate reported by the device, or 0 when unknown.
    pub fn maximum_frame_rate(&self) -> f64 {
        self.frame_rate.as_ref().map(|rate| rate.maximum()).unwrap_or_default()
    }
}

