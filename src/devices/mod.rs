pub mod service;

pub use service::{DeviceService, DeviceUpdate, NewDevice};
