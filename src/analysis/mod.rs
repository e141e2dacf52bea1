pub mod levels;
pub mod patterns;
pub mod trend;
pub mod zones;

pub use levels::{atr, LevelCalculator, LevelError, Levels};
pub use patterns::{detect, PatternKind, PatternMatch};
pub use trend::{classify_trend, ema};
pub use zones::{zone_levels, ZoneLevel};
