pub mod channel;
pub mod settings;

pub use channel::DeliveryChannel;
pub use settings::{ConfigFileSettings, DeliverySettings, SettingsSource, StaticSettings};
