//! Entry CRUD, split by read/write.

mod read;
mod write;
