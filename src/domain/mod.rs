mod account;
mod clock;
mod entry;
mod money;
mod reservation;
mod revenue;

pub use account::*;
pub use clock::*;
pub use entry::*;
pub use money::*;
pub use reservation::*;
pub use revenue::*;
