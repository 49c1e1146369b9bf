pub mod custom_upload;
pub mod frameworks;
pub mod health;
