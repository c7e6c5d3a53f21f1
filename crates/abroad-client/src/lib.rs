//! Abroad client library
//!
//! Authentication session lifecycle and REST client for the study-abroad
//! mentoring backend:
//!
//! - [`token`]: bearer token expiry inspection
//! - [`storage`]: durable key/value storage for the persisted session
//! - [`session`]: the session store, single owner of user, token and state
//! - [`request`]: bearer injection with one refresh and one retry on 401
//! - [`monitor`]: background refresh ahead of expiry
//! - [`bootstrap`]: once-per-process startup wiring it all together
//! - [`api`]: feature endpoints (mentors, forum, chat, profile, files)
//!
//! Author: hephaex@gmail.com

pub mod api;
pub mod backend;
pub mod bootstrap;
pub mod error;
pub mod monitor;
pub mod request;
pub mod session;
pub mod storage;
pub mod token;

#[cfg(test)]
mod testing;

pub use backend::{AuthBackend, HttpBackend};
pub use bootstrap::AbroadClient;
pub use error::{ClientError, Result};
pub use monitor::{MonitorConfig, RefreshMonitor};
pub use request::AuthorizedClient;
pub use session::{Session, SessionState, SessionStore};
pub use storage::{FileStorage, MemoryStorage, SessionStorage};
