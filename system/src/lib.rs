mod message;
mod sync;
mod time;
mod types;

pub use message::*;
pub use sync::*;
pub use time::*;
pub use types::*;

pub extern crate bincode;
pub extern crate serde;
pub extern crate serde_json;
pub extern crate uuid;
