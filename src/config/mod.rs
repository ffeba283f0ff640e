//! Cache, locator and provider configuration

mod configuration;
mod expiry;
mod locator;
mod provider;

pub use configuration::{
  CacheConfiguration, CompleteConfiguration, ConfigurationView, Factory, TypeDescriptor,
};
pub use expiry::{CreatedExpiryPolicy, EternalExpiryPolicy, ExpiryDuration, ExpiryPolicy};
pub use locator::{Locator, ServerAddress, DEFAULT_LOCATOR, DEFAULT_SEPARATOR};
pub use provider::ProviderConfig;
