pub mod info;
pub mod upload;
