pub mod secure_auth;

pub use secure_auth::SecureAuthentication;
