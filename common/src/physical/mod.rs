mod distance;

pub use distance::*;
