pub mod channel;
pub mod request;
pub mod response;
pub mod scope;
