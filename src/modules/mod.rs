pub mod oauth;
pub mod oauth_server;
pub mod quota;
pub mod store;
