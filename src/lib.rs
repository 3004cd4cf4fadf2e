pub mod cursor;
pub mod restype;
pub mod archive;
pub mod bitmap;
pub mod movie;
pub mod extract;
