pub mod layout;
pub mod shared_array;
pub mod world;

pub use layout::Layout;
pub use shared_array::DistributedArray;
pub use world::{PeContext, World};
