//! Point-cloud and IMU payloads.

use super::config::ScanPattern;

/// One complete sampling cycle.
///
/// A frame is either structured (`scanlines` populated) or packed
/// (`packed` populated), never both.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Frame {
    #[prost(uint64, optional, tag = "1")]
    pub id: Option<u64>,
    #[prost(uint64, optional, tag = "2")]
    pub start_time_ns: Option<u64>,
    #[prost(message, optional, tag = "3")]
    pub scan_pattern: Option<ScanPattern>,
    #[prost(uint32, optional, tag = "4")]
    pub total_number_of_points: Option<u32>,
    #[prost(uint32, optional, tag = "5")]
    pub total_number_of_returns: Option<u32>,
    /// Set while the mirror ramps up; selects the scanline side in `SEPARATE` mode.
    #[prost(bool, optional, tag = "6")]
    pub is_ramp_up_phase: Option<bool>,
    #[prost(message, repeated, tag = "10")]
    pub scanlines: Vec<Scanline>,
    #[prost(message, optional, tag = "11")]
    pub packed: Option<frame::Packed>,
}

pub mod frame {
    /// Columnar form of a frame. Every column is a big-endian array indexed by
    /// return; a column is present only if the subscriber requested that field.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Packed {
        #[prost(uint32, optional, tag = "1")]
        pub length: Option<u32>,
        /// `u32` per return.
        #[prost(bytes = "vec", optional, tag = "2")]
        pub point_id: Option<Vec<u8>>,
        /// Three `f32` per return.
        #[prost(bytes = "vec", optional, tag = "3")]
        pub cartesian: Option<Vec<u8>>,
        #[prost(bytes = "vec", optional, tag = "4")]
        pub range: Option<Vec<u8>>,
        /// `u32` per return.
        #[prost(bytes = "vec", optional, tag = "5")]
        pub intensity: Option<Vec<u8>>,
        /// `u32` per return.
        #[prost(bytes = "vec", optional, tag = "6")]
        pub ambient_light_level: Option<Vec<u8>>,
        /// Azimuth and elevation, two `f32` per return.
        #[prost(bytes = "vec", optional, tag = "7")]
        pub direction: Option<Vec<u8>>,
        /// `u64` per return.
        #[prost(bytes = "vec", optional, tag = "8")]
        pub start_offset_ns: Option<Vec<u8>>,
        /// `u8` per return.
        #[prost(bytes = "vec", optional, tag = "9")]
        pub channel_id: Option<Vec<u8>>,
        /// `u8` per return.
        #[prost(bytes = "vec", optional, tag = "10")]
        pub return_id: Option<Vec<u8>>,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Scanline {
    #[prost(uint32, optional, tag = "1")]
    pub id: Option<u32>,
    #[prost(uint64, optional, tag = "2")]
    pub start_offset_ns: Option<u64>,
    #[prost(message, repeated, tag = "3")]
    pub points: Vec<Point>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Point {
    #[prost(uint32, optional, tag = "1")]
    pub id: Option<u32>,
    #[prost(uint32, optional, tag = "2")]
    pub channel_id: Option<u32>,
    #[prost(message, optional, tag = "3")]
    pub direction: Option<point::Direction>,
    #[prost(uint32, optional, tag = "4")]
    pub ambient_light_level: Option<u32>,
    #[prost(uint64, optional, tag = "5")]
    pub start_offset_ns: Option<u64>,
    #[prost(message, repeated, tag = "6")]
    pub returns: Vec<point::Return>,
}

pub mod point {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Direction {
        #[prost(float, optional, tag = "1")]
        pub azimuth: Option<f32>,
        #[prost(float, optional, tag = "2")]
        pub elevation: Option<f32>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Return {
        #[prost(uint32, optional, tag = "1")]
        pub id: Option<u32>,
        #[prost(float, repeated, tag = "2")]
        pub cartesian: Vec<f32>,
        #[prost(float, optional, tag = "3")]
        pub range: Option<f32>,
        #[prost(uint32, optional, tag = "4")]
        pub intensity: Option<u32>,
    }
}

/// A burst of inertial samples.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Imu {
    #[prost(uint64, optional, tag = "1")]
    pub start_time_ns: Option<u64>,
    #[prost(message, repeated, tag = "2")]
    pub samples: Vec<imu::Sample>,
    #[prost(message, optional, tag = "3")]
    pub packed: Option<imu::Packed>,
}

pub mod imu {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Sample {
        #[prost(uint64, optional, tag = "1")]
        pub start_offset_ns: Option<u64>,
        /// m/s², x y z.
        #[prost(float, repeated, tag = "2")]
        pub acceleration: Vec<f32>,
        /// rad/s, x y z.
        #[prost(float, repeated, tag = "3")]
        pub angular_velocity: Vec<f32>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Packed {
        #[prost(uint32, optional, tag = "1")]
        pub length: Option<u32>,
        #[prost(bytes = "vec", optional, tag = "2")]
        pub start_offset_ns: Option<Vec<u8>>,
        #[prost(bytes = "vec", optional, tag = "3")]
        pub acceleration: Option<Vec<u8>>,
        #[prost(bytes = "vec", optional, tag = "4")]
        pub angular_velocity: Option<Vec<u8>>,
    }
}
