pub mod service;

pub use service::{NotificationSettingsUpdate, PreferencesUpdate, UserProfile, UserService};
