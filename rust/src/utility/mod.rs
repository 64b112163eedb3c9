pub mod clock;
pub mod id_pool;

pub use clock::{Clock, ManualClock, SystemClock};
pub use id_pool::IdPool;
