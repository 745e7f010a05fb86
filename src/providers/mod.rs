//! Frame sources: live subscriptions and recording replay.

pub mod live;
pub mod replay;

pub use live::LiveSource;
pub use replay::ReplaySource;
