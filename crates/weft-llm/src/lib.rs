pub mod mock;
pub mod reliable;

pub use mock::{MockBackend, MockResponse};
pub use reliable::{ReliableConfig, RetryingBackend};
