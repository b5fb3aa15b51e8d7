pub mod common;
pub mod mangastream;
