mod club;
mod principal;
mod session;

pub use club::*;
pub use principal::*;
pub use session::*;
