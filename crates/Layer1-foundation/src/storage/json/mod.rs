mod store;

pub use store::{JsonStore, StoreScope};
