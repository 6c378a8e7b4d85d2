//! Message bus transport for actuator commands

pub mod mqtt;
pub mod traits;

pub use mqtt::{MqttConfig, MqttDriverHandle, MqttPublisher};
pub use traits::{PublishError, Publisher};
