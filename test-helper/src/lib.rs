mod addr;
mod dirs;

pub use addr::get_unused_addr;
pub use dirs::{temp_dir, temp_file};
