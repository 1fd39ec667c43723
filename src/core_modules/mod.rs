pub mod active_zone;
pub mod background_model;
pub mod blob;
pub mod blob_labeler;
pub mod frame_buffer;
pub mod label_map;
pub mod polygon;
pub mod timestamp;
pub mod tracker;
pub mod utils;
