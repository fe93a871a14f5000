pub mod disk;

pub use disk::DiskCache;
