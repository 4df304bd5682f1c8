//! Small helpers shared across products.

pub mod emulator;
pub mod subscribe;

pub use emulator::{create_mock_user_token, EmulatorMockTokenOptions};
pub use subscribe::{ObserverList, Subscription};
