mod mmap;

pub use mmap::{map_file, read_exact_at, MappingCache};
