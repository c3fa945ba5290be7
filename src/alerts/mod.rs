pub mod filter;
pub mod service;

pub use filter::{AlertFilter, AlertSortField, PageRequest, SortDirection};
pub use service::{AlertService, AlertUpdate, NewAlert};
