pub mod note;
pub mod range;
pub mod reconciler;
pub mod state;
pub mod sustain;

pub use note::*;
pub use range::*;
pub use reconciler::*;
pub use state::*;
pub use sustain::*;
