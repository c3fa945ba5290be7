pub mod service;

pub use service::{NewReading, SensorDataService};
