pub mod bluetooth;
pub mod location;
pub mod logging;
pub mod notifier;
