pub mod credentials;
pub mod guard;
pub mod token;
