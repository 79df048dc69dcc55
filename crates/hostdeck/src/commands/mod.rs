pub mod account;
pub mod deploy;
pub mod instance;
pub mod ls;
