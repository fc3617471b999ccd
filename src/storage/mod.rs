pub mod local;

pub use local::{LocalStorage, CONNECTION_STATE_KEY, SETTINGS_KEY};
