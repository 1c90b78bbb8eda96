pub mod jobs;
pub mod oauth;
pub mod system;
pub mod users;
