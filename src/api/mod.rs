pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
