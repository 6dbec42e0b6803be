//! Built-in behaviors, grouped by responsibility.

mod children;
mod completion;
mod display;
mod output;
mod rounds;
mod sound;
pub(crate) mod timer;

pub use children::{ChildLoop, ChildRunner, IntervalRollover, RestBlockGuard};
pub use completion::{PopOnEvent, PopOnNext};
pub use display::{ButtonEvent, ControlsInit, DisplayInit};
pub use output::{HistoryRecord, SegmentOutput};
pub use rounds::{RoundAdvance, RoundCompletion, RoundDisplay, RoundInit, RoundOutput};
pub use sound::{SoundCue, SoundSpec};
pub use timer::{TimerCompletion, TimerInit, TimerOutput, TimerPause, TimerTick};
