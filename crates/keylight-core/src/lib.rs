pub mod app;
pub mod input_queue;
pub mod ipc;
pub mod mode;
pub mod playback_engine;
pub mod scheduler;
pub mod transport;

pub use app::*;
pub use input_queue::*;
pub use ipc::*;
pub use mode::*;
pub use playback_engine::*;
pub use scheduler::*;
pub use transport::*;
