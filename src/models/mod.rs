pub mod candle;
pub mod direction;
pub mod signal;
pub mod tick;
pub mod timeframe;

pub use candle::{Candle, CandleSeries};
pub use direction::*;
pub use signal::Signal;
pub use tick::Tick;
pub use timeframe::Timeframe;
