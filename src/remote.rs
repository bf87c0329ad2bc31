pub mod scan;
pub mod transfer;

pub use scan::scan_remote;
pub use transfer::Uploader;
