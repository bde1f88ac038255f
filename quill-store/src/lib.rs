// Generic reactive state container shared by all SDK subsystems
mod instance;
mod store;

pub use instance::{Disposer, SdkInstance};
pub use store::{Store, StoreObserver};
