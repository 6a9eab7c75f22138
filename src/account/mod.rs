pub mod client;
pub mod deployer;
pub mod dispatcher;
pub mod types;
