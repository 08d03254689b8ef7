pub mod feed;
pub mod resources;
pub mod session;
