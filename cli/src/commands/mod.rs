pub mod cli;
pub mod fetch;
pub mod http_server;
