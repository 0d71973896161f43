//! Authentication flows: registration, login with the email code
//! challenge, sessions, email verification, and password reset/change.

pub mod codec;
pub mod device;
pub mod error;
pub mod login;
pub mod password;
pub mod principal;
pub mod profile;
pub mod register;
pub mod session;
pub mod state;
pub mod storage;
pub mod types;
pub mod verification;

mod hasher;

pub use error::AuthError;
pub use state::{AuthConfig, AuthState};
