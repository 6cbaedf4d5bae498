pub mod dom;
pub mod funda;
pub mod kamernet;
pub mod normalize;
pub mod pararius;
pub mod room;
pub mod traits;
pub mod types;

pub use funda::FundaSource;
pub use kamernet::KamernetSource;
pub use pararius::ParariusSource;
pub use room::RoomSource;
pub use traits::SourceAdapter;
pub use types::{Pacing, SearchParams};
