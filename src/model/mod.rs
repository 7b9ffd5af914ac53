pub mod attendance;
pub mod device;
